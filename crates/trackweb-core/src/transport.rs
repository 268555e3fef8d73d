//! Outbound HTTP plumbing
//!
//! `HttpClient` is shared by the dashboard side (`ProxyTransport`, which
//! talks to the proxy endpoint) and by the proxy itself when it forwards to
//! the upstream system.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use base64::Engine;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use std::sync::Arc;
use std::time::Duration;
use trackweb_config::Config;

/// Header the proxy sets when the failure is its own rather than upstream's
pub const PROXY_ERROR_HEADER: &str = "x-trackweb-proxy-error";

/// Transport reference type
pub type TransportRef = Arc<dyn Transport>;

/// Raw response of one HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Value of `PROXY_ERROR_HEADER`, if present
    pub proxy_error: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// hyper client with a per-request timeout
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpConnector>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request and collect the whole body
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> CoreResult<HttpResponse> {
        let mut builder = Request::builder().method(method.clone()).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .map_err(|e| CoreError::Config {
                message: format!("invalid request URI {}: {}", uri, e),
            })?;

        log::debug!("{} {}", method, uri);

        let exchange = async {
            let response = self.client.request(request).await?;
            let status = response.status().as_u16();
            let proxy_error = response
                .headers()
                .get(PROXY_ERROR_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>(HttpResponse { status, body, proxy_error })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(CoreError::network(e.to_string())),
            Err(_) => Err(CoreError::Timeout {
                operation: format!("{} {}", method, uri),
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// `Authorization` value for HTTP basic authentication
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    let token = base64::engine::general_purpose::STANDARD.encode(credentials);
    format!("Basic {}", token)
}

/// URL-encode query pairs
pub fn encode_query<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Extract the message of a `{ "error": message }` envelope
pub fn error_envelope(value: &serde_json::Value) -> Option<String> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    match object.get("error")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Map a proxy response onto the error taxonomy, or return its JSON body
pub fn interpret_response(response: &HttpResponse) -> CoreResult<serde_json::Value> {
    let blank = response.body.iter().all(|b| b.is_ascii_whitespace());
    let parsed: Option<serde_json::Value> = if blank {
        Some(serde_json::Value::Null)
    } else {
        serde_json::from_slice(&response.body).ok()
    };

    if let Some(kind) = &response.proxy_error {
        let message = parsed
            .as_ref()
            .and_then(error_envelope)
            .unwrap_or_else(|| format!("proxy failure ({})", kind));
        return Err(CoreError::network(message));
    }

    match parsed {
        Some(value) => match error_envelope(&value) {
            Some(message) => Err(CoreError::upstream(response.status, message)),
            None if response.is_success() => Ok(value),
            None => Err(CoreError::network(format!("proxy returned HTTP {}", response.status))),
        },
        None if response.is_success() => Err(CoreError::Decode {
            message: "response body is not JSON".to_string(),
        }),
        None => Err(CoreError::network(format!("proxy returned HTTP {}", response.status))),
    }
}

// ==================== Transport Trait ====================

/// Request/response contract the data service runs on
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET an upstream resource path with extra query parameters
    async fn get(&self, path: &str, query: &[(String, String)]) -> CoreResult<serde_json::Value>;

    /// POST a JSON body to an upstream resource path
    async fn post(&self, path: &str, body: &serde_json::Value) -> CoreResult<serde_json::Value>;
}

/// Transport that goes through the proxy endpoint (`?path=<resource>`)
#[derive(Clone)]
pub struct ProxyTransport {
    endpoint: String,
    http: HttpClient,
}

impl ProxyTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: HttpClient::new(timeout),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.proxy_endpoint(),
            Duration::from_secs(config.client.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn uri(&self, path: &str, query: &[(String, String)]) -> String {
        let pairs = std::iter::once(("path", path))
            .chain(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        format!("{}?{}", self.endpoint, encode_query(pairs))
    }

    fn json_headers() -> Vec<(&'static str, String)> {
        vec![
            ("accept", "application/json".to_string()),
            ("content-type", "application/json".to_string()),
        ]
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn get(&self, path: &str, query: &[(String, String)]) -> CoreResult<serde_json::Value> {
        let response = self
            .http
            .send(Method::GET, &self.uri(path, query), &Self::json_headers(), None)
            .await?;
        interpret_response(&response)
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> CoreResult<serde_json::Value> {
        let payload = serde_json::to_vec(body)?;
        let response = self
            .http
            .send(Method::POST, &self.uri(path, &[]), &Self::json_headers(), Some(payload))
            .await?;
        interpret_response(&response)
    }
}

// ==================== Tests ====================
