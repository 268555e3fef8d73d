//! Authenticating proxy in front of the upstream tracker API
//!
//! Routes:
//! - GET /api/health: liveness check
//! - GET /api/proxy: forward a read with query parameters
//! - POST /api/proxy: forward a JSON body

pub mod error;
pub mod routes;
pub mod upstream;

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use trackweb_config::Config;

pub use error::ApiError;
pub use upstream::Upstream;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Upstream,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let upstream = Upstream::from_config(&config.upstream);
        Self {
            config: Arc::new(config),
            upstream,
        }
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    use routes::proxy::{proxy_get, proxy_post};

    let cors = cors_layer(&state.config.server.cors_origins);
    let router = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/proxy", get(proxy_get).post(proxy_post))
        .with_state(state);

    match cors {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

/// CORS for the configured origins; `*` allows any origin
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    Some(layer.allow_origin(AllowOrigin::list(allowed)))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Serve on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, create_router(state)).await
}

/// Start the proxy server, stopping on Ctrl-C
pub async fn start_server(config: Config) -> std::io::Result<()> {
    let addr = config.listen_addr();
    let state = AppState::new(config);

    if !state.upstream.has_credentials() {
        log::warn!(
            "no upstream credentials configured; requests are forwarded without Authorization"
        );
    }

    let listener = TcpListener::bind(&addr).await?;
    log::info!("Starting trackweb proxy on http://{}", listener.local_addr()?);
    log::info!("Forwarding /api/proxy to {}", state.upstream.base_url());

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use trackweb_core::PROXY_ERROR_HEADER;

    fn state_with_upstream(base_url: &str) -> AppState {
        let mut config = Config::default();
        config.upstream.base_url = base_url.to_string();
        config.upstream.timeout_secs = 2;
        AppState::new(config)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let router = create_router(state_with_upstream("http://127.0.0.1:1"));
        let response = router
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_missing_path_is_bad_request() {
        let router = create_router(state_with_upstream("http://127.0.0.1:1"));
        let response = router
            .oneshot(Request::builder().uri("/api/proxy?count=10").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(PROXY_ERROR_HEADER).unwrap(), "bad_request");
        assert!(body_json(response).await["error"].as_str().unwrap().contains("path"));
    }

    #[tokio::test]
    async fn test_invalid_post_body_is_bad_request() {
        let router = create_router(state_with_upstream("http://127.0.0.1:1"));
        let request = Request::builder()
            .method("POST")
            .uri("/api/proxy?path=R/1/reprocess")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let router = create_router(state_with_upstream(&format!("http://127.0.0.1:{}", port)));
        let response = router
            .oneshot(Request::builder().uri("/api/proxy?path=R").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers().get(PROXY_ERROR_HEADER).unwrap(), "unreachable");
        assert!(body_json(response).await.get("error").is_some());
    }

    #[test]
    fn test_cors_layer() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_some());
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_some());
    }
}
