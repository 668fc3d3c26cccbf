use reqwest::Client;
use serde_json::json;
use tokio::net;
use url::Url;

use crate::providers::Outcome;
use crate::types::{Signal, Source};

// ============================================================================
// LOCAL HEURISTICS
// ============================================================================

const SUSPICIOUS_KEYWORDS: [&str; 8] = [
    "login", "update", "verify", "account", "secure", "bank", "wallet", "password",
];

// Additive component weights, clamped to 100.
const DNS_FAILURE: u32 = 20;
const HEAD_FAILURE: u32 = 20;
const HTTP_ERROR_STATUS: u32 = 15;
const DOMAIN_SHAPE: u32 = 10;
const SUSPICIOUS_QUERY: u32 = 10;

/// Pure heuristic scoring over probe results and URL shape. `head_status` is
/// `None` when the HEAD request itself failed.
pub fn heuristic_score(dns_ok: bool, head_status: Option<u16>, host: &str, query: &str) -> u32 {
    let mut score = 0;

    if !dns_ok {
        score += DNS_FAILURE;
    }
    match head_status {
        None => score += HEAD_FAILURE,
        Some(status) if status >= 400 => score += HTTP_ERROR_STATUS,
        Some(_) => {}
    }
    if host.split('.').count() > 3 && host.len() > 40 {
        score += DOMAIN_SHAPE;
    }
    let query_lower = query.to_ascii_lowercase();
    if SUSPICIOUS_KEYWORDS.iter().any(|keyword| query_lower.contains(keyword)) {
        score += SUSPICIOUS_QUERY;
    }

    score.min(100)
}

/// Probes DNS resolution and HTTP reachability, then scores the URL shape.
/// Purely local failure modes feed the score, so this provider never errors.
pub async fn check(client: &Client, target: &Url) -> Outcome {
    let host = target.host_str().unwrap_or_default().to_string();
    let (dns, head) = tokio::join!(resolve(&host), head_follow(client, target));

    let dns_ok = dns.is_ok();
    let head_status = head.as_ref().ok().map(|probe| probe.status);

    let dns_detail = match &dns {
        Ok(addresses) => json!({ "ok": true, "addresses": addresses }),
        Err(error) => json!({ "ok": false, "error": error }),
    };
    let head_detail = match &head {
        Ok(probe) => json!({
            "ok": true,
            "status": probe.status,
            "final_url": probe.final_url,
            "content_type": probe.content_type,
        }),
        Err(error) => json!({ "ok": false, "error": error }),
    };

    let score = heuristic_score(dns_ok, head_status, &host, target.query().unwrap_or_default());

    Outcome::new(
        Signal::new(Source::Heur, score as f64, "Heuristic checks"),
        json!({ "dns": dns_detail, "http_head": head_detail }),
    )
}

async fn resolve(host: &str) -> Result<Vec<String>, String> {
    if host.is_empty() {
        return Err("no host in URL".to_string());
    }

    let addresses = net::lookup_host((host, 0))
        .await
        .map_err(|error| error.to_string())?
        .map(|addr| addr.ip().to_string())
        .collect::<Vec<_>>();

    if addresses.is_empty() {
        Err("no addresses resolved".to_string())
    } else {
        Ok(addresses)
    }
}

struct HeadProbe {
    status: u16,
    final_url: String,
    content_type: Option<String>,
}

async fn head_follow(client: &Client, target: &Url) -> Result<HeadProbe, String> {
    let response = client
        .head(target.clone())
        .send()
        .await
        .map_err(|error| error.to_string())?;

    Ok(HeadProbe {
        status: response.status().as_u16(),
        final_url: response.url().to_string(),
        content_type: response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string()),
    })
}
