use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::types::{RiskStatus, Verdict};

// ============================================================================
// TELEMETRY
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub urls_checked: u64,
    pub files_checked: u64,
    pub degraded_signals: u64,
    pub safe: u64,
    pub suspicious: u64,
    pub danger: u64,
    pub uptime: String,
}

#[derive(Debug, Default)]
struct StatsCounters {
    urls_checked: u64,
    files_checked: u64,
    degraded_signals: u64,
    safe: u64,
    suspicious: u64,
    danger: u64,
}

impl StatsCounters {
    fn record_status(&mut self, status: RiskStatus) {
        match status {
            RiskStatus::Safe => self.safe = self.safe.saturating_add(1),
            RiskStatus::Suspicious => self.suspicious = self.suspicious.saturating_add(1),
            RiskStatus::Danger => self.danger = self.danger.saturating_add(1),
        }
    }
}

pub struct TelemetryStore {
    start_time: SystemTime,
    stats: Mutex<StatsCounters>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        TelemetryStore {
            start_time: SystemTime::now(),
            stats: Mutex::new(StatsCounters::default()),
        }
    }

    pub async fn record_url_check(&self, verdict: &Verdict, degraded: u64) {
        let mut stats = self.stats.lock().await;
        stats.urls_checked = stats.urls_checked.saturating_add(1);
        stats.degraded_signals = stats.degraded_signals.saturating_add(degraded);
        stats.record_status(verdict.status);
    }

    pub async fn record_file_check(&self, verdict: &Verdict, degraded: u64) {
        let mut stats = self.stats.lock().await;
        stats.files_checked = stats.files_checked.saturating_add(1);
        stats.degraded_signals = stats.degraded_signals.saturating_add(degraded);
        stats.record_status(verdict.status);
    }

    pub async fn snapshot_stats(&self) -> StatsSnapshot {
        let stats = self.stats.lock().await;
        StatsSnapshot {
            urls_checked: stats.urls_checked,
            files_checked: stats.files_checked,
            degraded_signals: stats.degraded_signals,
            safe: stats.safe,
            suspicious: stats.suspicious,
            danger: stats.danger,
            uptime: format_uptime(
                SystemTime::now()
                    .duration_since(self.start_time)
                    .unwrap_or(Duration::from_secs(0)),
            ),
        }
    }
}

fn format_uptime(duration: Duration) -> String {
    let total_minutes = duration.as_secs() / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::combine;
    use crate::types::{Signal, Source};

    #[tokio::test]
    async fn counters_track_checks_and_statuses() {
        let store = TelemetryStore::new();
        let safe = combine(&[]);
        let danger = combine(&[
            Signal::new(Source::Gsb, 100.0, "listed"),
            Signal::new(Source::Vt, 100.0, "flagged"),
        ]);

        store.record_url_check(&danger, 1).await;
        store.record_file_check(&safe, 0).await;

        let snapshot = store.snapshot_stats().await;
        assert_eq!(snapshot.urls_checked, 1);
        assert_eq!(snapshot.files_checked, 1);
        assert_eq!(snapshot.degraded_signals, 1);
        assert_eq!(snapshot.safe, 1);
        assert_eq!(snapshot.danger, 1);
        assert_eq!(snapshot.suspicious, 0);
    }

    #[test]
    fn uptime_formats_days_hours_minutes() {
        let uptime = format_uptime(Duration::from_secs(26 * 3600 + 5 * 60));
        assert_eq!(uptime, "1d 2h 5m");
    }
}
