//! Error types for trackweb-api

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use trackweb_core::{CoreError, PROXY_ERROR_HEADER};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Upstream answered with a failure status
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream unreachable: {message}")]
    Unreachable { message: String },

    #[error("Upstream did not answer within {millis}ms")]
    Timeout { millis: u64 },

    #[error("Upstream returned an invalid body: {message}")]
    InvalidBody { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        ApiError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of the error response
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Unreachable { .. } | ApiError::InvalidBody { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Marker sent in the proxy error header. `None` for upstream failures,
    /// which are relayed as they are.
    pub fn proxy_error_kind(&self) -> Option<&'static str> {
        match self {
            ApiError::BadRequest { .. } => Some("bad_request"),
            ApiError::Upstream { .. } => None,
            ApiError::Unreachable { .. } => Some("unreachable"),
            ApiError::Timeout { .. } => Some("timeout"),
            ApiError::InvalidBody { .. } => Some("invalid_body"),
            ApiError::Internal { .. } => Some("internal"),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Network { message } => ApiError::Unreachable { message },
            CoreError::Timeout { millis, .. } => ApiError::Timeout { millis },
            CoreError::Upstream { status, message } => ApiError::Upstream { status, message },
            CoreError::Validation { message } => ApiError::BadRequest { message },
            CoreError::Decode { message } => ApiError::InvalidBody { message },
            CoreError::Config { message } | CoreError::Internal { message } => {
                ApiError::Internal { message }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.proxy_error_kind();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if let Some(kind) = kind {
            response
                .headers_mut()
                .insert(PROXY_ERROR_HEADER, HeaderValue::from_static(kind));
        }
        response
    }
}
