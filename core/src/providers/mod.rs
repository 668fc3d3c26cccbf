pub mod gsb;
pub mod heuristics;
pub mod virustotal;
pub mod whois;

use serde_json::json;
use thiserror::Error;

use crate::types::{Signal, Source};

// ============================================================================
// PROVIDER CONTRACT
// ============================================================================

/// Failure taxonomy for external signal providers. Every variant is recovered
/// locally: a failed provider degrades to a score-0 signal instead of failing
/// the aggregate request.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} key not configured")]
    MissingKey(&'static str),
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        ProviderError::Unavailable(error.to_string())
    }
}

/// A settled provider call: the signal handed to the aggregator plus the raw
/// diagnostic payload echoed in the response body.
#[derive(Debug)]
pub struct Outcome {
    pub signal: Signal,
    pub detail: serde_json::Value,
}

impl Outcome {
    pub fn new(signal: Signal, detail: serde_json::Value) -> Self {
        Outcome { signal, detail }
    }
}

/// Converts a provider result into a settled outcome. Errors become degraded
/// signals, so the settle-all barrier in the orchestrator never propagates a
/// per-provider failure.
pub fn settle(source: Source, result: Result<Outcome, ProviderError>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(error) => {
            let message = error.to_string();
            let detail = match error {
                ProviderError::MissingKey(_) => json!({ "warning": message }),
                _ => json!({ "error": message }),
            };
            Outcome {
                signal: Signal::degraded(source, message),
                detail,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_error_becomes_degraded_signal() {
        let outcome = settle(
            Source::Gsb,
            Err(ProviderError::Unavailable("connection refused".to_string())),
        );
        assert_eq!(outcome.signal.score, 0.0);
        assert_eq!(outcome.signal.source, Source::Gsb);
        assert!(outcome.signal.reason.contains("connection refused"));
        assert!(outcome.detail.get("error").is_some());
    }

    #[test]
    fn missing_key_is_reported_as_warning() {
        let outcome = settle(Source::Vt, Err(ProviderError::MissingKey("VirusTotal")));
        assert_eq!(outcome.signal.score, 0.0);
        assert!(outcome.detail.get("warning").is_some());
    }

    #[test]
    fn ok_outcome_passes_through() {
        let outcome = settle(
            Source::Heur,
            Ok(Outcome::new(
                Signal::new(Source::Heur, 10.0, "Heuristic checks"),
                json!({ "ok": true }),
            )),
        );
        assert_eq!(outcome.signal.score, 10.0);
    }
}
