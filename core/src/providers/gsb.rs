use reqwest::Client;
use serde_json::json;
use url::Url;

use crate::providers::{Outcome, ProviderError};
use crate::types::{Signal, Source};

// ============================================================================
// GOOGLE SAFE BROWSING v4
// ============================================================================

const LOOKUP_ENDPOINT: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";

/// Looks the URL up in the Safe Browsing blocklists. A listed URL scores 100,
/// anything else 0. A missing key short-circuits before any network I/O.
pub async fn check_url(
    client: &Client,
    key: Option<&str>,
    target: &Url,
) -> Result<Outcome, ProviderError> {
    let key = key.ok_or(ProviderError::MissingKey("Google Safe Browsing"))?;

    let body = json!({
        "client": { "clientId": "defenderlink", "clientVersion": "1.0" },
        "threatInfo": {
            "threatTypes": [
                "MALWARE",
                "SOCIAL_ENGINEERING",
                "UNWANTED_SOFTWARE",
                "POTENTIALLY_HARMFUL_APPLICATION"
            ],
            "platformTypes": ["ANY_PLATFORM"],
            "threatEntryTypes": ["URL"],
            "threatEntries": [{ "url": target.as_str() }]
        }
    });

    let response = client
        .post(format!("{}?key={}", LOOKUP_ENDPOINT, key))
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ProviderError::Status(response.status()));
    }

    let payload: serde_json::Value = response
        .json()
        .await
        .map_err(|error| ProviderError::Malformed(error.to_string()))?;

    let listed = payload
        .get("matches")
        .and_then(|matches| matches.as_array())
        .is_some_and(|matches| !matches.is_empty());

    let signal = if listed {
        Signal::new(Source::Gsb, 100.0, "Listed by Google Safe Browsing")
    } else {
        Signal::new(Source::Gsb, 0.0, "Not listed")
    };
    let detail = if listed {
        payload
    } else {
        json!({ "status": "not_listed" })
    };

    Ok(Outcome::new(signal, detail))
}
