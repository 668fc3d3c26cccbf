use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::info;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::CoreConfig;
use crate::feeds::{FeedCache, FeedKind};
use crate::providers::{self, gsb, heuristics, virustotal, whois, Outcome, ProviderError};
use crate::risk;
use crate::telemetry::TelemetryStore;
use crate::types::{RiskStatus, Signal, SignalDetail, Source};

// ============================================================================
// SCAN PIPELINE
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UrlReport {
    pub input: String,
    pub domain: String,
    pub status: RiskStatus,
    pub score: u32,
    pub parts: BTreeMap<Source, SignalDetail>,
    pub details: Value,
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub hash: String,
    pub status: RiskStatus,
    pub score: u32,
    pub parts: BTreeMap<Source, SignalDetail>,
    pub details: Value,
}

/// Accepts the raw user input as-is, or retries with an https scheme when
/// none was given. Only http(s) targets with a host are checkable.
pub fn normalize_target(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Retry with a prefix only when the input does not parse on its own;
    // inputs that parse with a non-http scheme (e.g. "ftp://x") are rejected
    // below instead of being mangled into a bogus https host.
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => Url::parse(&format!("https://{}", trimmed)).ok()?,
    };

    match url.scheme() {
        "http" | "https" if url.has_host() => Some(url),
        _ => None,
    }
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn epoch_seconds(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

/// Fans out to the signal providers, settles every branch into a signal
/// (degrading failures in place) and aggregates the survivors into one
/// verdict. The aggregator runs exactly once per request, after all provider
/// branches have settled.
pub struct ScanPipeline {
    config: CoreConfig,
    client: reqwest::Client,
    feeds: Arc<FeedCache>,
    telemetry: Arc<TelemetryStore>,
}

impl ScanPipeline {
    pub fn new(
        config: CoreConfig,
        feeds: Arc<FeedCache>,
        telemetry: Arc<TelemetryStore>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|error| error.to_string())?;

        Ok(ScanPipeline {
            config,
            client,
            feeds,
            telemetry,
        })
    }

    pub async fn check_url(&self, target: Url) -> UrlReport {
        // Best-effort conditional refresh; failures keep the last snapshot.
        self.feeds.refresh().await;

        let normalized = target.to_string();
        let origin = target.origin().ascii_serialization();
        let domain = target.host_str().unwrap_or_default().to_string();

        let (gsb_result, vt_result, openphish_result, phishtank_result, heur, whois_record) = tokio::join!(
            gsb::check_url(&self.client, self.config.gsb_key.as_deref(), &target),
            virustotal::check_url(
                &self.client,
                self.config.vt_key.as_deref(),
                self.config.vt_poll_attempts,
                &target,
            ),
            self.feed_check(FeedKind::OpenPhish, Source::OpenPhish, &normalized, &origin),
            self.feed_check(FeedKind::PhishTank, Source::PhishTank, &normalized, &origin),
            heuristics::check(&self.client, &target),
            self.whois_record(&domain),
        );

        let degraded = [
            gsb_result.is_err(),
            vt_result.is_err(),
            openphish_result.is_err(),
            phishtank_result.is_err(),
        ]
        .into_iter()
        .filter(|failed| *failed)
        .count() as u64;

        let gsb = providers::settle(Source::Gsb, gsb_result);
        let vt = providers::settle(Source::Vt, vt_result);
        let openphish = providers::settle(Source::OpenPhish, openphish_result);
        let phishtank = providers::settle(Source::PhishTank, phishtank_result);

        let mut details = Map::new();
        details.insert(
            "meta".to_string(),
            json!({ "checked_at": epoch_seconds(SystemTime::now()) }),
        );
        details.insert("google_safe_browsing".to_string(), gsb.detail);
        details.insert("virustotal".to_string(), vt.detail);
        details.insert("openphish".to_string(), openphish.detail);
        details.insert("phishtank".to_string(), phishtank.detail);
        if let Value::Object(probes) = heur.detail {
            details.extend(probes);
        }
        if let Some(record) = whois_record {
            details.insert("whois".to_string(), record);
        }

        let signals = vec![
            gsb.signal,
            vt.signal,
            openphish.signal,
            phishtank.signal,
            heur.signal,
        ];
        let verdict = risk::combine(&signals);

        info!(
            "[SCAN] url={} score={} status={:?} degraded={}",
            domain, verdict.score, verdict.status, degraded
        );
        self.telemetry.record_url_check(&verdict, degraded).await;

        UrlReport {
            input: normalized,
            domain,
            status: verdict.status,
            score: verdict.score,
            parts: verdict.breakdown,
            details: Value::Object(details),
        }
    }

    /// File checks have a single provider; a completely absent VirusTotal key
    /// is a configuration failure for the whole request, not a degradation.
    pub async fn check_file(&self, bytes: Vec<u8>) -> Result<FileReport, String> {
        if self.config.vt_key.is_none() {
            return Err("VIRUSTOTAL_API_KEY not set".to_string());
        }

        let sha256 = hash_bytes(&bytes);
        let result = virustotal::check_file(
            &self.client,
            self.config.vt_key.as_deref(),
            self.config.vt_poll_attempts,
            &sha256,
            bytes,
        )
        .await;

        let degraded = u64::from(result.is_err());
        let vt = providers::settle(Source::Vt, result);

        let signals = vec![vt.signal];
        let verdict = risk::combine(&signals);

        info!(
            "[SCAN] file sha256={} score={} status={:?}",
            sha256, verdict.score, verdict.status
        );
        self.telemetry.record_file_check(&verdict, degraded).await;

        Ok(FileReport {
            hash: sha256,
            status: verdict.status,
            score: verdict.score,
            parts: verdict.breakdown,
            details: json!({ "virustotal": vt.detail }),
        })
    }

    async fn feed_check(
        &self,
        kind: FeedKind,
        source: Source,
        normalized: &str,
        origin: &str,
    ) -> Result<Outcome, ProviderError> {
        let feed_name = match kind {
            FeedKind::OpenPhish => "OpenPhish",
            FeedKind::PhishTank => "PhishTank",
        };

        match self.feeds.membership(kind, &[normalized, origin]).await {
            Some(true) => Ok(Outcome::new(
                Signal::new(source, 100.0, format!("Found in {} feed", feed_name)),
                json!({ "listed": true }),
            )),
            Some(false) => Ok(Outcome::new(
                Signal::new(source, 0.0, "Not in feed"),
                json!({ "listed": false }),
            )),
            None => Err(ProviderError::Unavailable(format!(
                "{} feed not loaded",
                feed_name
            ))),
        }
    }

    async fn whois_record(&self, domain: &str) -> Option<Value> {
        if !self.config.whois_enabled || domain.is_empty() {
            return None;
        }
        Some(whois::lookup(domain).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_pipeline() -> ScanPipeline {
        let config = CoreConfig {
            api_addr: "127.0.0.1:0".to_string(),
            gsb_key: None,
            vt_key: None,
            http_timeout: Duration::from_secs(1),
            feed_timeout: Duration::from_secs(1),
            vt_poll_attempts: 1,
            max_file_bytes: 1024 * 1024,
            whois_enabled: false,
        };
        let feeds = Arc::new(FeedCache::new(config.feed_timeout).unwrap());
        let telemetry = Arc::new(TelemetryStore::new());
        ScanPipeline::new(config, feeds, telemetry).unwrap()
    }

    #[tokio::test]
    async fn failing_providers_degrade_without_failing_the_request() {
        let pipeline = offline_pipeline();
        let target = normalize_target("https://host.invalid/").unwrap();

        let report = pipeline.check_url(target).await;

        // every source settles to a placeholder, even with no keys, no feed
        // snapshots and a non-resolving host
        assert_eq!(report.parts.len(), 5);
        for source in [
            Source::Gsb,
            Source::Vt,
            Source::OpenPhish,
            Source::PhishTank,
            Source::Heur,
        ] {
            assert!(report.parts.contains_key(&source), "missing {:?}", source);
        }

        assert_eq!(report.parts[&Source::Gsb].score, 0);
        assert!(report.parts[&Source::Gsb].reason.contains("key not configured"));
        assert_eq!(report.parts[&Source::Vt].score, 0);
        assert_eq!(report.parts[&Source::OpenPhish].score, 0);
        assert_eq!(report.parts[&Source::PhishTank].score, 0);

        // only the local heuristics can contribute here, so the verdict
        // stays within the heur weight
        assert!(report.score <= 5);
        assert_eq!(report.status, RiskStatus::Safe);
        assert_eq!(report.domain, "host.invalid");

        // one diagnostic entry per attempted source
        for key in ["google_safe_browsing", "virustotal", "openphish", "phishtank", "dns", "http_head"] {
            assert!(report.details.get(key).is_some(), "missing detail {}", key);
        }

        let stats = pipeline.telemetry.snapshot_stats().await;
        assert_eq!(stats.urls_checked, 1);
    }

    #[tokio::test]
    async fn unloaded_feed_reports_unavailable_not_clean() {
        let pipeline = offline_pipeline();
        let result = pipeline
            .feed_check(
                FeedKind::OpenPhish,
                Source::OpenPhish,
                "https://host.invalid/",
                "https://host.invalid",
            )
            .await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn bare_domains_get_an_https_scheme() {
        let url = normalize_target("example.com/path").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn explicit_schemes_are_kept() {
        let url = normalize_target("  http://example.com  ").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn unusable_targets_are_rejected() {
        assert!(normalize_target("").is_none());
        assert!(normalize_target("   ").is_none());
        assert!(normalize_target("ftp://example.com").is_none());
        assert!(normalize_target("not a url").is_none());
        assert!(normalize_target("mailto:someone@example.com").is_none());
    }

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
