use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, warn};

use sitesmith_core::types::TaskId;
use sitesmith_store::{SiteStore, INDEX_FILE};

use crate::protocol::RpcRequest;
use crate::state::AppState;

pub const CONNECTION_HEADER: &str = "x-connection-id";
pub const METADATA_HEADER: &str = "x-site-metadata";

// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "name": "sitesmith",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

// GET /tools
pub async fn tools(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tools: Vec<_> = state
        .dispatcher
        .catalog()
        .into_iter()
        .map(|t| {
            json!({
                "name": t["name"],
                "description": t["description"],
                "parameters": t["inputSchema"],
            })
        })
        .collect();
    Json(json!({ "tools": tools }))
}

// GET /sse: open a streaming session
pub async fn sse_open(State(state): State<Arc<AppState>>) -> Response {
    let session = state.registry.open_session();
    let id = session.id().to_string();

    let built = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .header(CONNECTION_HEADER, id.as_str())
        .body(Body::from_stream(session.into_event_stream()));

    match built {
        Ok(resp) => resp,
        Err(e) => {
            state.registry.close_session(&id);
            warn!(error = %e, "Failed to build SSE response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// POST /sse: JSON-RPC request, answered in the body and on the stream
pub async fn sse_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match RpcRequest::parse(&body) {
        Ok(req) => req,
        Err(envelope) => {
            debug!(error = ?envelope.error, "Rejected JSON-RPC envelope");
            return (StatusCode::BAD_REQUEST, Json(envelope.to_value())).into_response();
        }
    };

    let addressed = headers
        .get(CONNECTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty());

    let response = state.dispatcher.dispatch(request, addressed).await;
    Json(response.to_value()).into_response()
}

// GET /sites/{site_id}
pub async fn serve_site(
    State(state): State<Arc<AppState>>,
    Path(site_id): Path<String>,
) -> Response {
    let task = TaskId::new(&site_id);
    let Some(html) = state.store.read_to_string(&task, INDEX_FILE).await else {
        return site_not_found(&site_id);
    };

    let mut resp = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        html,
    )
        .into_response();

    if let Some(value) = metadata_header(&state.store, &task).await {
        resp.headers_mut().insert(METADATA_HEADER, value);
    }
    resp
}

// GET /sites/{site_id}/{*path}
pub async fn serve_site_file(
    State(state): State<Arc<AppState>>,
    Path((site_id, path)): Path<(String, String)>,
) -> Response {
    let task = TaskId::new(&site_id);
    let Ok(file) = state.store.resolve(&task, &path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(data) => {
            let mime = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                data,
            )
                .into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn site_not_found(site_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Site '{site_id}' not found") })),
    )
        .into_response()
}

async fn metadata_header(store: &SiteStore, task: &TaskId) -> Option<HeaderValue> {
    let meta = store.read_metadata(task).await?;
    let text = serde_json::to_string(&meta).ok()?;
    HeaderValue::from_str(&ascii_json(&text)).ok()
}

/// Escape non-ASCII characters of serialized JSON as `\uXXXX` so the text
/// is a valid header value.
pub fn ascii_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_json_escapes_non_ascii() {
        assert_eq!(ascii_json(r#"{"a":"plain"}"#), r#"{"a":"plain"}"#);
        assert_eq!(ascii_json("café"), "caf\\u00e9");
        assert_eq!(ascii_json("🚀"), "\\ud83d\\ude80");

        let original = serde_json::json!({"requirements": "Bäckerei 🚀"});
        let escaped = ascii_json(&original.to_string());
        assert!(escaped.is_ascii());
        let back: serde_json::Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(back, original);
    }
}
