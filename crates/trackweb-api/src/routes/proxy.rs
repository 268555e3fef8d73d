//! Proxy endpoints
//!
//! - proxy_get: `GET /api/proxy?path=<resource>&...` forwards every other
//!   query parameter
//! - proxy_post: `POST /api/proxy?path=<resource>` forwards the JSON body

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Query, State};
use axum::Json;
use bytes::Bytes;

/// Query parameter naming the upstream resource
pub const PATH_PARAM: &str = "path";

/// Split the `path` parameter from the ones to forward
fn split_path(params: Vec<(String, String)>) -> (String, Vec<(String, String)>) {
    let mut path = None;
    let mut rest = Vec::with_capacity(params.len());
    for (key, value) in params {
        if key == PATH_PARAM {
            path.get_or_insert(value);
        } else {
            rest.push((key, value));
        }
    }
    (path.unwrap_or_default(), rest)
}

pub async fn proxy_get(
    state: State<AppState>,
    params: Query<Vec<(String, String)>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (path, query) = split_path(params.0);
    let value = state.upstream.get(&path, &query).await?;
    Ok(Json(value))
}

pub async fn proxy_post(
    state: State<AppState>,
    params: Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (path, _) = split_path(params.0);
    let body: serde_json::Value = if body.iter().all(|b| b.is_ascii_whitespace()) {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)))?
    };
    let value = state.upstream.post(&path, &body).await?;
    Ok(Json(value))
}
