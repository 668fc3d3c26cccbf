use std::collections::BTreeMap;

use crate::types::{RiskStatus, Signal, SignalDetail, Source, Verdict};

// ============================================================================
// RISK AGGREGATOR
// ============================================================================

const DANGER_THRESHOLD: u32 = 70;
const SUSPICIOUS_THRESHOLD: u32 = 30;

fn weight(source: Source) -> f64 {
    match source {
        Source::Gsb => 0.40,
        Source::Vt => 0.35,
        Source::OpenPhish => 0.12,
        Source::PhishTank => 0.08,
        Source::Heur => 0.05,
    }
}

fn clamp_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// Combines provider signals into one weighted, bounded verdict.
///
/// Pure and order-insensitive for the total score; no I/O, no shared state.
/// Works on any subset of signals, including none at all (score 0, safe).
/// Duplicate entries for the same source each contribute to the weighted sum,
/// while the breakdown keeps the last one seen.
pub fn combine(signals: &[Signal]) -> Verdict {
    let mut score = 0.0;
    let mut breakdown = BTreeMap::new();

    for signal in signals {
        let clamped = clamp_score(signal.score);
        score += clamped * weight(signal.source);
        breakdown.insert(
            signal.source,
            SignalDetail {
                score: clamped.round() as u32,
                reason: signal.reason.clone(),
            },
        );
    }

    let total = score.round() as u32;
    Verdict {
        score: total,
        status: classify(total),
        breakdown,
    }
}

fn classify(score: u32) -> RiskStatus {
    if score >= DANGER_THRESHOLD {
        RiskStatus::Danger
    } else if score >= SUSPICIOUS_THRESHOLD {
        RiskStatus::Suspicious
    } else {
        RiskStatus::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(source: Source, score: f64) -> Signal {
        Signal::new(source, score, "test")
    }

    #[test]
    fn empty_input_is_safe_zero() {
        let verdict = combine(&[]);
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.status, RiskStatus::Safe);
        assert!(verdict.breakdown.is_empty());
    }

    #[test]
    fn single_gsb_hit_is_suspicious() {
        let verdict = combine(&[signal(Source::Gsb, 100.0)]);
        assert_eq!(verdict.score, 40);
        assert_eq!(verdict.status, RiskStatus::Suspicious);
    }

    #[test]
    fn gsb_and_vt_hits_are_danger() {
        let verdict = combine(&[signal(Source::Gsb, 100.0), signal(Source::Vt, 100.0)]);
        assert_eq!(verdict.score, 75);
        assert_eq!(verdict.status, RiskStatus::Danger);
    }

    #[test]
    fn all_sources_maxed_hit_the_ceiling() {
        let verdict = combine(&[
            signal(Source::Gsb, 100.0),
            signal(Source::Vt, 100.0),
            signal(Source::OpenPhish, 100.0),
            signal(Source::PhishTank, 100.0),
            signal(Source::Heur, 100.0),
        ]);
        assert_eq!(verdict.score, 100);
        assert_eq!(verdict.status, RiskStatus::Danger);
    }

    #[test]
    fn scores_above_range_are_clamped() {
        let over = combine(&[signal(Source::Heur, 150.0)]);
        let max = combine(&[signal(Source::Heur, 100.0)]);
        assert_eq!(over.score, max.score);
        assert_eq!(over.breakdown[&Source::Heur].score, 100);
    }

    #[test]
    fn negative_and_non_finite_scores_contribute_nothing() {
        let verdict = combine(&[signal(Source::Gsb, -50.0), signal(Source::Vt, f64::NAN)]);
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.status, RiskStatus::Safe);
        assert_eq!(verdict.breakdown[&Source::Gsb].score, 0);
    }

    #[test]
    fn monotonic_in_each_signal() {
        let low = combine(&[signal(Source::Vt, 40.0), signal(Source::Heur, 10.0)]);
        let high = combine(&[signal(Source::Vt, 60.0), signal(Source::Heur, 10.0)]);
        assert!(high.score >= low.score);
    }

    #[test]
    fn half_rounds_up() {
        // 30 * 0.05 = 1.5 -> 2
        let verdict = combine(&[signal(Source::Heur, 30.0)]);
        assert_eq!(verdict.score, 2);
    }

    #[test]
    fn absent_sources_are_absent_from_breakdown() {
        let verdict = combine(&[signal(Source::Gsb, 10.0)]);
        assert!(!verdict.breakdown.contains_key(&Source::Vt));
        assert_eq!(verdict.breakdown.len(), 1);
    }

    #[test]
    fn duplicate_source_sums_both_but_keeps_last_detail() {
        let verdict = combine(&[
            Signal::new(Source::Heur, 100.0, "first"),
            Signal::new(Source::Heur, 100.0, "second"),
        ]);
        // both instances weighted: 2 * 100 * 0.05 = 10
        assert_eq!(verdict.score, 10);
        assert_eq!(verdict.breakdown[&Source::Heur].reason, "second");
    }

    #[test]
    fn threshold_edges() {
        assert_eq!(classify(29), RiskStatus::Safe);
        assert_eq!(classify(30), RiskStatus::Suspicious);
        assert_eq!(classify(69), RiskStatus::Suspicious);
        assert_eq!(classify(70), RiskStatus::Danger);
    }
}
