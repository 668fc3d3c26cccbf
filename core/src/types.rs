use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// SIGNALS
// ============================================================================

/// Identifies which provider produced a signal. Serialized keys match the
/// `parts` object of the JSON report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Gsb,
    Vt,
    #[serde(rename = "openphish")]
    OpenPhish,
    #[serde(rename = "phishtank")]
    PhishTank,
    Heur,
}

/// One provider's bounded risk score plus a human-readable reason.
/// Immutable once created, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub source: Source,
    pub score: f64,
    pub reason: String,
}

impl Signal {
    pub fn new(source: Source, score: f64, reason: impl Into<String>) -> Self {
        Signal {
            source,
            score,
            reason: reason.into(),
        }
    }

    /// Substitute for a provider that failed, timed out or lacked
    /// configuration. Score 0 with an explanatory reason.
    pub fn degraded(source: Source, reason: impl Into<String>) -> Self {
        Signal {
            source,
            score: 0.0,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// VERDICTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskStatus {
    Safe,
    Suspicious,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDetail {
    pub score: u32,
    pub reason: String,
}

/// The aggregated score, status classification and per-source breakdown
/// returned to the caller. One verdict per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub score: u32,
    pub status: RiskStatus,
    pub breakdown: BTreeMap<Source, SignalDetail>,
}
