use std::time::Duration;

// ============================================================================
// CORE CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub api_addr: String,
    pub gsb_key: Option<String>,
    pub vt_key: Option<String>,
    pub http_timeout: Duration,
    pub feed_timeout: Duration,
    pub vt_poll_attempts: u32,
    pub max_file_bytes: u64,
    pub whois_enabled: bool,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let api_addr =
            std::env::var("DL_API_ADDR").unwrap_or_else(|_| "127.0.0.1:8090".to_string());

        let gsb_key = read_secret_env("GOOGLE_SAFE_BROWSING_KEY");
        let vt_key = read_secret_env("VIRUSTOTAL_API_KEY");

        let http_timeout_secs = std::env::var("DL_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(clamp_timeout_secs)
            .unwrap_or(10);

        let feed_timeout_secs = std::env::var("DL_FEED_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(clamp_timeout_secs)
            .unwrap_or(8);

        let vt_poll_attempts = std::env::var("DL_VT_POLL_ATTEMPTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .map(clamp_poll_attempts)
            .unwrap_or(3);

        let max_file_bytes = std::env::var("DL_MAX_FILE_BYTES")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(clamp_max_file_bytes)
            .unwrap_or(32 * 1024 * 1024);

        let whois_enabled = parse_bool_env("DL_WHOIS_ENABLED", true);

        CoreConfig {
            api_addr,
            gsb_key,
            vt_key,
            http_timeout: Duration::from_secs(http_timeout_secs),
            feed_timeout: Duration::from_secs(feed_timeout_secs),
            vt_poll_attempts,
            max_file_bytes,
            whois_enabled,
        }
    }
}

fn read_secret_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn clamp_timeout_secs(value: u64) -> u64 {
    let normalized = if value == 0 { 1 } else { value };
    normalized.min(60)
}

fn clamp_poll_attempts(value: u32) -> u32 {
    let normalized = if value == 0 { 1 } else { value };
    normalized.min(10)
}

fn clamp_max_file_bytes(value: u64) -> u64 {
    let normalized = if value < 1024 { 1024 } else { value };
    normalized.min(256 * 1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_clamped_into_range() {
        assert_eq!(clamp_timeout_secs(0), 1);
        assert_eq!(clamp_timeout_secs(10), 10);
        assert_eq!(clamp_timeout_secs(600), 60);
    }

    #[test]
    fn poll_attempts_stay_within_budget() {
        assert_eq!(clamp_poll_attempts(0), 1);
        assert_eq!(clamp_poll_attempts(3), 3);
        assert_eq!(clamp_poll_attempts(50), 10);
    }

    #[test]
    fn file_size_limit_has_a_floor_and_ceiling() {
        assert_eq!(clamp_max_file_bytes(0), 1024);
        assert_eq!(clamp_max_file_bytes(1024 * 1024), 1024 * 1024);
        assert_eq!(clamp_max_file_bytes(u64::MAX), 256 * 1024 * 1024);
    }
}
