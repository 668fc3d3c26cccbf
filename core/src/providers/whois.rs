use std::time::Duration;

use log::debug;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

// ============================================================================
// WHOIS (informational only, never affects the score)
// ============================================================================

const IANA_WHOIS: &str = "whois.iana.org";
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Resolves the registry whois server through IANA and fetches the record.
/// Failures degrade to an error payload in the report details.
pub async fn lookup(domain: &str) -> serde_json::Value {
    match lookup_inner(domain).await {
        Ok(value) => value,
        Err(error) => {
            debug!("[WHOIS] lookup for {} failed: {}", domain, error);
            json!({ "error": error })
        }
    }
}

async fn lookup_inner(domain: &str) -> Result<serde_json::Value, String> {
    let referral = query(IANA_WHOIS, domain).await?;

    let server = referral
        .lines()
        .find_map(|line| line.strip_prefix("refer:"))
        .map(str::trim)
        .filter(|server| !server.is_empty() && *server != IANA_WHOIS)
        .map(str::to_string);

    match server {
        Some(server) => match query(&server, domain).await {
            Ok(raw) => Ok(json!({ "server": server, "raw": raw })),
            Err(_) => Ok(json!({ "server": IANA_WHOIS, "raw": referral })),
        },
        None => Ok(json!({ "server": IANA_WHOIS, "raw": referral })),
    }
}

async fn query(server: &str, domain: &str) -> Result<String, String> {
    let exchange = async {
        let mut stream = TcpStream::connect((server, 43))
            .await
            .map_err(|error| error.to_string())?;
        stream
            .write_all(format!("{}\r\n", domain).as_bytes())
            .await
            .map_err(|error| error.to_string())?;

        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream
                .read(&mut chunk)
                .await
                .map_err(|error| error.to_string())?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if buffer.len() >= MAX_RESPONSE_BYTES {
                buffer.truncate(MAX_RESPONSE_BYTES);
                break;
            }
        }

        Ok(String::from_utf8_lossy(&buffer).to_string())
    };

    timeout(QUERY_TIMEOUT, exchange)
        .await
        .map_err(|_| "whois query timed out".to_string())?
}
