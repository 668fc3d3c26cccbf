use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::CoreConfig;
use crate::scan::{normalize_target, ScanPipeline};
use crate::telemetry::{StatsSnapshot, TelemetryStore};

// ============================================================================
// HTTP API
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<ScanPipeline>,
    pub telemetry: Arc<TelemetryStore>,
    pub config: Arc<CoreConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckUrlRequest {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckFileRequest {
    data: String,
}

pub async fn serve(addr: String, state: ApiState) -> Result<(), Box<dyn std::error::Error>> {
    let body_limit = state.config.max_file_bytes as usize;
    let app = Router::new()
        .route("/api/status", get(status))
        .route("/api/check/url", post(check_url))
        .route("/api/check/file", post(check_file))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer());

    let addr: SocketAddr = addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn status(State(state): State<ApiState>) -> Json<StatsSnapshot> {
    Json(state.telemetry.snapshot_stats().await)
}

async fn check_url(State(state): State<ApiState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let payload: CheckUrlRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return bad_request("Bad JSON"),
    };

    let Some(raw) = payload.url.filter(|url| !url.trim().is_empty()) else {
        return bad_request("URL is required");
    };

    let Some(target) = normalize_target(&raw) else {
        return bad_request("Invalid URL");
    };

    let report = state.pipeline.check_url(target).await;
    match serde_json::to_value(&report) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(error) => internal_error(error.to_string()),
    }
}

/// Accepts the file either as raw bytes (`application/octet-stream`) or as a
/// base64 payload in a JSON envelope.
async fn check_file(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let bytes = if content_type.starts_with("application/octet-stream") {
        body.to_vec()
    } else if content_type.starts_with("application/json") {
        let payload: CheckFileRequest = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(_) => return bad_request("Bad JSON"),
        };
        match base64::engine::general_purpose::STANDARD.decode(payload.data.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return bad_request("Invalid base64 payload"),
        }
    } else {
        return bad_request("Send raw file bytes with application/octet-stream");
    };

    if bytes.is_empty() {
        return bad_request("No file uploaded");
    }
    if bytes.len() as u64 > state.config.max_file_bytes {
        return bad_request("File exceeds size limit");
    }

    match state.pipeline.check_file(bytes).await {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(value) => (StatusCode::OK, Json(value)),
            Err(error) => internal_error(error.to_string()),
        },
        Err(error) => internal_error(error),
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error(message: String) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

fn cors_layer() -> CorsLayer {
    let allowed = std::env::var("DL_CORS_ORIGIN").unwrap_or_else(|_| "*".to_string());

    let mut cors = if allowed.trim() == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = allowed
            .split(',')
            .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    cors = cors.allow_methods([Method::GET, Method::POST]);
    cors.allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_request_tolerates_missing_field() {
        let parsed: CheckUrlRequest = serde_json::from_str("{}").unwrap();
        assert!(parsed.url.is_none());

        let parsed: CheckUrlRequest =
            serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(parsed.url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn file_request_requires_data_field() {
        assert!(serde_json::from_str::<CheckFileRequest>("{}").is_err());
        let parsed: CheckFileRequest = serde_json::from_str(r#"{"data": "aGVsbG8="}"#).unwrap();
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(parsed.data)
                .unwrap(),
            b"hello"
        );
    }
}
