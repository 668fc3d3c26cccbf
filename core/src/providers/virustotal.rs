use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::json;
use url::Url;

use crate::providers::{Outcome, ProviderError};
use crate::types::{Signal, Source};

// ============================================================================
// VIRUSTOTAL v3
// ============================================================================

const API_BASE: &str = "https://www.virustotal.com/api/v3";

// Analysis polling budget: first wait is longer because fresh submissions are
// almost never ready immediately.
const FIRST_POLL_DELAY: Duration = Duration::from_secs(4);
const POLL_DELAY: Duration = Duration::from_secs(3);

/// URL analyses weight malicious engines heavier than file reports because a
/// handful of engines flagging a URL is already a strong indicator.
fn url_score(malicious: u64, suspicious: u64) -> f64 {
    (malicious * 20 + suspicious * 10).min(100) as f64
}

fn file_score(malicious: u64, suspicious: u64) -> f64 {
    (malicious * 10 + suspicious * 5).min(100) as f64
}

fn analysis_stats(payload: &serde_json::Value) -> (u64, u64) {
    let stats = &payload["data"]["attributes"]["stats"];
    (
        stats["malicious"].as_u64().unwrap_or(0),
        stats["suspicious"].as_u64().unwrap_or(0),
    )
}

fn report_stats(payload: &serde_json::Value) -> (u64, u64) {
    let stats = &payload["data"]["attributes"]["last_analysis_stats"];
    (
        stats["malicious"].as_u64().unwrap_or(0),
        stats["suspicious"].as_u64().unwrap_or(0),
    )
}

fn analysis_completed(payload: &serde_json::Value) -> bool {
    payload["data"]["attributes"]["status"]
        .as_str()
        .is_some_and(|status| status == "completed")
}

/// Submits the URL for analysis and polls the analysis report within the
/// attempt budget. Budget exhaustion yields a pending signal, not an error.
pub async fn check_url(
    client: &Client,
    key: Option<&str>,
    attempts: u32,
    target: &Url,
) -> Result<Outcome, ProviderError> {
    let key = key.ok_or(ProviderError::MissingKey("VirusTotal"))?;

    let response = client
        .post(format!("{}/urls", API_BASE))
        .header("x-apikey", key)
        .form(&[("url", target.as_str())])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ProviderError::Status(response.status()));
    }

    let submission: serde_json::Value = response
        .json()
        .await
        .map_err(|error| ProviderError::Malformed(error.to_string()))?;

    let Some(analysis_id) = submission["data"]["id"].as_str().map(str::to_string) else {
        return Err(ProviderError::Malformed("submission without analysis id".to_string()));
    };

    poll_analysis(client, key, attempts, &analysis_id, url_score, "VirusTotal URL stats").await
}

/// Hash-lookup-first file check. A known hash answers straight from the
/// report; an unknown one falls back to upload-and-defer, polling the fresh
/// analysis within the same budget.
pub async fn check_file(
    client: &Client,
    key: Option<&str>,
    attempts: u32,
    sha256: &str,
    bytes: Vec<u8>,
) -> Result<Outcome, ProviderError> {
    let key = key.ok_or(ProviderError::MissingKey("VirusTotal"))?;

    let response = client
        .get(format!("{}/files/{}", API_BASE, sha256))
        .header("x-apikey", key)
        .send()
        .await?;

    match response.status() {
        StatusCode::OK => {
            let payload: serde_json::Value = response
                .json()
                .await
                .map_err(|error| ProviderError::Malformed(error.to_string()))?;
            let (malicious, suspicious) = report_stats(&payload);
            let signal = Signal::new(
                Source::Vt,
                file_score(malicious, suspicious),
                format!("{} malicious, {} suspicious engine reports", malicious, suspicious),
            );
            Ok(Outcome::new(signal, payload))
        }
        StatusCode::NOT_FOUND => upload_and_defer(client, key, attempts, bytes).await,
        status => Err(ProviderError::Status(status)),
    }
}

async fn upload_and_defer(
    client: &Client,
    key: &str,
    attempts: u32,
    bytes: Vec<u8>,
) -> Result<Outcome, ProviderError> {
    let form = Form::new().part("file", Part::bytes(bytes).file_name("upload.bin"));

    let response = client
        .post(format!("{}/files", API_BASE))
        .header("x-apikey", key)
        .multipart(form)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ProviderError::Status(response.status()));
    }

    let submission: serde_json::Value = response
        .json()
        .await
        .map_err(|error| ProviderError::Malformed(error.to_string()))?;

    let Some(analysis_id) = submission["data"]["id"].as_str().map(str::to_string) else {
        // Uploaded but nothing to poll; report the deferral as pending.
        return Ok(Outcome::new(
            Signal::degraded(Source::Vt, "File uploaded, analysis pending"),
            submission,
        ));
    };

    poll_analysis(client, key, attempts, &analysis_id, file_score, "VirusTotal file analysis").await
}

/// Polls an analysis until it completes or the attempt budget runs out.
/// Exceeding the budget stops polling and reports "pending" rather than
/// blocking indefinitely.
async fn poll_analysis(
    client: &Client,
    key: &str,
    attempts: u32,
    analysis_id: &str,
    score: fn(u64, u64) -> f64,
    reason: &str,
) -> Result<Outcome, ProviderError> {
    let mut last_payload = json!({ "analysis_id": analysis_id });

    for attempt in 0..attempts {
        let delay = if attempt == 0 { FIRST_POLL_DELAY } else { POLL_DELAY };
        tokio::time::sleep(delay).await;

        let response = client
            .get(format!("{}/analyses/{}", API_BASE, analysis_id))
            .header("x-apikey", key)
            .send()
            .await?;

        if !response.status().is_success() {
            continue;
        }

        let payload: serde_json::Value = match response.json().await {
            Ok(payload) => payload,
            Err(_) => continue,
        };

        if analysis_completed(&payload) {
            let (malicious, suspicious) = analysis_stats(&payload);
            let signal = Signal::new(Source::Vt, score(malicious, suspicious), reason);
            return Ok(Outcome::new(signal, payload));
        }
        last_payload = payload;
    }

    Ok(Outcome::new(
        Signal::degraded(
            Source::Vt,
            format!("Analysis not ready after {} attempts", attempts),
        ),
        last_payload,
    ))
}
