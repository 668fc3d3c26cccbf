use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::debug;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tokio::sync::RwLock;

// ============================================================================
// PHISHING FEED CACHE
// ============================================================================

const OPENPHISH_FEED: &str = "https://openphish.com/feed.txt";
const PHISHTANK_FEED: &str = "https://data.phishtank.com/data/online-valid.json";

/// Shared normalization for feed ingest and membership queries. The two must
/// match exactly or lookups silently miss.
pub fn normalize_entry(value: &str) -> String {
    value.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    OpenPhish,
    PhishTank,
}

impl FeedKind {
    fn url(&self) -> &'static str {
        match self {
            FeedKind::OpenPhish => OPENPHISH_FEED,
            FeedKind::PhishTank => PHISHTANK_FEED,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FeedKind::OpenPhish => "openphish",
            FeedKind::PhishTank => "phishtank",
        }
    }

    /// OpenPhish publishes a newline list; PhishTank a JSON record array.
    fn parse(&self, body: &str) -> HashSet<String> {
        match self {
            FeedKind::OpenPhish => body
                .lines()
                .map(normalize_entry)
                .filter(|line| !line.is_empty())
                .collect(),
            FeedKind::PhishTank => {
                let records: Vec<serde_json::Value> =
                    serde_json::from_str(body).unwrap_or_default();
                records
                    .iter()
                    .filter_map(|record| record.get("url").and_then(|url| url.as_str()))
                    .map(normalize_entry)
                    .filter(|url| !url.is_empty())
                    .collect()
            }
        }
    }
}

/// In-memory, atomically-replaced copy of a static phishing list. Created
/// empty at process start, replaced wholesale on a successful refresh and
/// read-only in between.
pub struct FeedSnapshot {
    entries: HashSet<String>,
    validator: Option<String>,
    loaded: bool,
    pub fetched_at: SystemTime,
}

impl FeedSnapshot {
    fn empty() -> Self {
        FeedSnapshot {
            entries: HashSet::new(),
            validator: None,
            loaded: false,
            fetched_at: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.entries.contains(normalized)
    }
}

struct FeedSlot {
    kind: FeedKind,
    snapshot: RwLock<Arc<FeedSnapshot>>,
}

impl FeedSlot {
    fn new(kind: FeedKind) -> Self {
        FeedSlot {
            kind,
            snapshot: RwLock::new(Arc::new(FeedSnapshot::empty())),
        }
    }

    async fn current(&self) -> Arc<FeedSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    async fn install(&self, snapshot: FeedSnapshot) {
        *self.snapshot.write().await = Arc::new(snapshot);
    }
}

/// Holds both phishing feeds in process-wide state. Refreshes are
/// single-writer conditional fetches; concurrent requests read whichever
/// snapshot is installed (stale reads allowed, half-written ones are not).
pub struct FeedCache {
    client: reqwest::Client,
    openphish: FeedSlot,
    phishtank: FeedSlot,
}

impl FeedCache {
    pub fn new(feed_timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(feed_timeout)
            .build()
            .map_err(|error| error.to_string())?;

        Ok(FeedCache {
            client,
            openphish: FeedSlot::new(FeedKind::OpenPhish),
            phishtank: FeedSlot::new(FeedKind::PhishTank),
        })
    }

    fn slot(&self, kind: FeedKind) -> &FeedSlot {
        match kind {
            FeedKind::OpenPhish => &self.openphish,
            FeedKind::PhishTank => &self.phishtank,
        }
    }

    /// Idempotent, safe to call before every request. Refresh failures are
    /// silent; the last-known-good snapshot keeps serving.
    pub async fn refresh(&self) {
        tokio::join!(self.refresh_slot(FeedKind::OpenPhish), self.refresh_slot(FeedKind::PhishTank));
    }

    async fn refresh_slot(&self, kind: FeedKind) {
        let slot = self.slot(kind);
        let validator = slot.current().await.validator.clone();

        let mut request = self.client.get(kind.url());
        if let Some(etag) = validator {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                debug!("[FEED] {} refresh failed: {}", kind.label(), error);
                return;
            }
        };

        match response.status() {
            StatusCode::OK => {
                let etag = response
                    .headers()
                    .get(ETAG)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.to_string());

                let body = match response.text().await {
                    Ok(body) => body,
                    Err(error) => {
                        debug!("[FEED] {} body read failed: {}", kind.label(), error);
                        return;
                    }
                };

                let entries = kind.parse(&body);
                debug!("[FEED] {} refreshed, {} entries", kind.label(), entries.len());
                slot.install(FeedSnapshot {
                    entries,
                    validator: etag,
                    loaded: true,
                    fetched_at: SystemTime::now(),
                })
                .await;
            }
            StatusCode::NOT_MODIFIED => {}
            status => {
                debug!("[FEED] {} refresh returned {}", kind.label(), status);
            }
        }
    }

    /// Membership of any candidate in the feed. `None` when no snapshot was
    /// ever loaded, so the caller can report the feed as unavailable rather
    /// than clean.
    pub async fn membership(&self, kind: FeedKind, candidates: &[&str]) -> Option<bool> {
        let snapshot = self.slot(kind).current().await;
        if !snapshot.loaded {
            return None;
        }
        Some(
            candidates
                .iter()
                .any(|candidate| snapshot.contains(&normalize_entry(candidate))),
        )
    }

    /// Simple membership check treating a never-loaded feed as empty.
    pub async fn lookup(&self, kind: FeedKind, value: &str) -> bool {
        self.membership(kind, &[value]).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_case_and_slash_insensitive() {
        assert_eq!(normalize_entry("HTTP://x.com/"), normalize_entry("http://x.com"));
        assert_eq!(normalize_entry("  http://A.com//  "), "http://a.com");
    }

    #[test]
    fn openphish_body_parses_to_normalized_set() {
        let body = "http://evil.example/\nHTTP://Other.example/login\n\n  \n";
        let entries = FeedKind::OpenPhish.parse(body);
        assert_eq!(entries.len(), 2);
        assert!(entries.contains("http://evil.example"));
        assert!(entries.contains("http://other.example/login"));
    }

    #[test]
    fn phishtank_body_parses_url_fields() {
        let body = r#"[
            {"phish_id": 1, "url": "http://bad.example/"},
            {"phish_id": 2, "url": "HTTPS://Worse.example/pay"},
            {"phish_id": 3}
        ]"#;
        let entries = FeedKind::PhishTank.parse(body);
        assert_eq!(entries.len(), 2);
        assert!(entries.contains("http://bad.example"));
        assert!(entries.contains("https://worse.example/pay"));
    }

    #[test]
    fn malformed_phishtank_body_yields_empty_set() {
        assert!(FeedKind::PhishTank.parse("not json").is_empty());
    }

    #[tokio::test]
    async fn membership_is_none_until_a_snapshot_loads() {
        let cache = FeedCache::new(Duration::from_secs(1)).unwrap();
        assert_eq!(cache.membership(FeedKind::OpenPhish, &["http://x.com"]).await, None);
        assert!(!cache.lookup(FeedKind::OpenPhish, "http://x.com").await);
    }

    #[tokio::test]
    async fn installed_snapshot_answers_normalized_queries() {
        let cache = FeedCache::new(Duration::from_secs(1)).unwrap();
        cache
            .slot(FeedKind::OpenPhish)
            .install(FeedSnapshot {
                entries: FeedKind::OpenPhish.parse("http://x.com/\n"),
                validator: Some("\"etag\"".to_string()),
                loaded: true,
                fetched_at: SystemTime::now(),
            })
            .await;

        assert_eq!(cache.membership(FeedKind::OpenPhish, &["HTTP://x.com/"]).await, Some(true));
        assert!(cache.lookup(FeedKind::OpenPhish, "http://x.com").await);
        assert!(!cache.lookup(FeedKind::OpenPhish, "http://y.com").await);
        // the other feed is still unloaded
        assert_eq!(cache.membership(FeedKind::PhishTank, &["http://x.com"]).await, None);
    }
}
