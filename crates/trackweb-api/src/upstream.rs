//! Forwarding to the upstream tracker API
//!
//! Builds `<base_url>/<path>?<query>` with every path segment URL-encoded,
//! injects the configured basic credentials and JSON headers, and maps the
//! answer onto `ApiError`.

use crate::error::ApiError;
use hyper::Method;
use std::time::Duration;
use trackweb_config::{AuthConfig, UpstreamConfig};
use trackweb_core::transport::{basic_auth_header, encode_query, error_envelope};
use trackweb_core::{HttpClient, HttpResponse};

/// Upstream endpoint with credentials
#[derive(Clone)]
pub struct Upstream {
    base_url: String,
    authorization: Option<String>,
    http: HttpClient,
}

impl Upstream {
    pub fn new(base_url: &str, auth: Option<&AuthConfig>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: auth.map(|a| basic_auth_header(&a.username, &a.password)),
            http: HttpClient::new(timeout),
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            &config.base_url,
            config.auth.as_ref(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.authorization.is_some()
    }

    /// Full upstream URI for a resource path and forwarded query
    pub fn target_uri(&self, path: &str, query: &[(String, String)]) -> Result<String, ApiError> {
        let path = encode_path(path)?;
        if query.is_empty() {
            Ok(format!("{}/{}", self.base_url, path))
        } else {
            let pairs = query.iter().map(|(k, v)| (k.as_str(), v.as_str()));
            Ok(format!("{}/{}?{}", self.base_url, path, encode_query(pairs)))
        }
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, ApiError> {
        let uri = self.target_uri(path, query)?;
        self.forward(Method::GET, &uri, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let uri = self.target_uri(path, &[])?;
        let payload = serde_json::to_vec(body).map_err(|e| ApiError::Internal {
            message: e.to_string(),
        })?;
        self.forward(Method::POST, &uri, Some(payload)).await
    }

    async fn forward(
        &self,
        method: Method,
        uri: &str,
        body: Option<Vec<u8>>,
    ) -> Result<serde_json::Value, ApiError> {
        log::info!("proxy {} {}", method, uri);

        let mut headers = vec![
            ("accept", "application/json".to_string()),
            ("content-type", "application/json".to_string()),
        ];
        if let Some(authorization) = &self.authorization {
            headers.push(("authorization", authorization.clone()));
        }

        let response = self.http.send(method, uri, &headers, body).await.map_err(|e| {
            log::error!("proxy request to {} failed: {}", uri, e);
            ApiError::from(e)
        })?;
        decode_upstream(response)
    }
}

/// Validate and encode a resource path: no empty path, no `.` or `..`
/// segments, each segment percent-encoded.
pub fn encode_path(path: &str) -> Result<String, ApiError> {
    let segments: Vec<&str> = path
        .trim()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(ApiError::bad_request("missing 'path' query parameter"));
    }
    if segments.iter().any(|s| *s == ".." || *s == ".") {
        return Err(ApiError::bad_request(format!(
            "path '{}' must not contain relative segments",
            path
        )));
    }
    Ok(segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Upstream JSON on success. Failure statuses keep the upstream status and
/// its `{error}` message when it sends one.
fn decode_upstream(response: HttpResponse) -> Result<serde_json::Value, ApiError> {
    let parsed = if response.body.iter().all(|b| b.is_ascii_whitespace()) {
        Ok(serde_json::Value::Null)
    } else {
        serde_json::from_slice::<serde_json::Value>(&response.body)
    };

    if response.is_success() {
        return parsed.map_err(|e| ApiError::InvalidBody {
            message: e.to_string(),
        });
    }

    let message = parsed
        .ok()
        .as_ref()
        .and_then(error_envelope)
        .unwrap_or_else(|| format!("Request failed with status code {}", response.status));
    log::warn!("upstream answered {}: {}", response.status, message);
    Err(ApiError::upstream(response.status, message))
}
