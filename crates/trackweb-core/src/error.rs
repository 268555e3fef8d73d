//! Error types for trackweb-core
//!
//! Every data-service failure is a `CoreError`. The coordinator turns them
//! into notices; nothing here is fatal to the process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Transport failure or non-2xx from the proxy
    NetworkError,
    /// Upstream reported a failure through the proxy
    UpstreamError,
    /// Request exceeded its timeout
    Timeout,
    /// Rejected before any network call
    ValidationError,
    /// Response body did not match the expected shape
    DecodeError,
    /// Configuration error
    ConfigError,
    /// Internal error
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NetworkError => write!(f, "NETWORK_ERROR"),
            ErrorCode::UpstreamError => write!(f, "UPSTREAM_ERROR"),
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::ValidationError => write!(f, "VALIDATION_ERROR"),
            ErrorCode::DecodeError => write!(f, "DECODE_ERROR"),
            ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Suggestions for resolution
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ErrorDetails {
    /// Create a new error detail
    pub fn new(code: ErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            details: None,
            suggestions: vec![],
        }
    }

    /// Add detail information
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.details = Some(detail);
        self
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, "\nDetails: {}", details)?;
        }
        if !self.suggestions.is_empty() {
            write!(f, "\nSuggestions:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n  - {}", suggestion)?;
            }
        }
        Ok(())
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational
    Info,
    /// Warning - the action was refused but nothing failed
    Warning,
    /// Error - operation failed
    Error,
    /// Critical - the process cannot work as configured
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Main error type for trackweb-core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Unexpected response: {message}")]
    Decode { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    pub fn network(message: impl Into<String>) -> Self {
        CoreError::Network {
            message: message.into(),
        }
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        CoreError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Network { .. } => ErrorCode::NetworkError,
            CoreError::Upstream { .. } => ErrorCode::UpstreamError,
            CoreError::Timeout { .. } => ErrorCode::Timeout,
            CoreError::Validation { .. } => ErrorCode::ValidationError,
            CoreError::Decode { .. } => ErrorCode::DecodeError,
            CoreError::Config { .. } => ErrorCode::ConfigError,
            CoreError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get the severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoreError::Network { .. } => ErrorSeverity::Error,
            CoreError::Upstream { .. } => ErrorSeverity::Error,
            CoreError::Timeout { .. } => ErrorSeverity::Error,
            CoreError::Validation { .. } => ErrorSeverity::Warning,
            CoreError::Decode { .. } => ErrorSeverity::Error,
            CoreError::Config { .. } => ErrorSeverity::Critical,
            CoreError::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// Whether repeating the triggering action may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Network { .. } | CoreError::Timeout { .. } => true,
            CoreError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Convert to detailed error info
    pub fn to_details(&self) -> ErrorDetails {
        let mut details = ErrorDetails::new(self.code(), self.to_string());

        match self {
            CoreError::Network { .. } => {
                details = details.with_suggestion(
                    "Check that the proxy server is running and reachable.".to_string()
                );
            }
            CoreError::Upstream { status, message } => {
                details = details.with_detail(serde_json::json!({
                    "status": status,
                    "upstream_message": message,
                }));
                if *status == 401 || *status == 403 {
                    details = details.with_suggestion(
                        "Verify the upstream credentials configured on the proxy.".to_string()
                    );
                }
            }
            CoreError::Timeout { .. } => {
                details = details.with_suggestion(
                    "Retry the action; raise client.timeout_secs if it keeps happening.".to_string()
                );
            }
            CoreError::Validation { message } => {
                details = details.with_detail(serde_json::json!({ "validation_message": message }));
            }
            CoreError::Decode { .. } => {
                details = details.with_suggestion(
                    "The upstream response format may have changed.".to_string()
                );
            }
            _ => {}
        }

        details
    }
}

/// Result type with CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        CoreError::Decode {
            message: error.to_string(),
        }
    }
}

/// Error context for reporting
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation being performed
    pub operation: String,
    /// Fetch generation the failure belongs to (if any)
    pub generation: Option<u64>,
    /// Additional context data
    pub data: serde_json::Value,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            generation: None,
            data: serde_json::json!({}),
        }
    }

    /// Add the fetch generation
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Add context data
    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data[key] = value;
        self
    }
}

/// Error logger trait
pub trait ErrorLogger: Send + Sync {
    /// Log an error
    fn log_error(&self, error: &CoreError, context: &ErrorContext);
    /// Log a warning
    fn log_warning(&self, message: &str, context: &ErrorContext);
}

/// Default error logger using log crate
#[derive(Default)]
pub struct DefaultErrorLogger;

impl ErrorLogger for DefaultErrorLogger {
    fn log_error(&self, error: &CoreError, context: &ErrorContext) {
        log::error!(
            target: "trackweb::error",
            "ERROR [{}] {} - Operation: {} - Generation: {:?} - Data: {}",
            error.code(),
            error,
            context.operation,
            context.generation,
            context.data
        );
    }

    fn log_warning(&self, message: &str, context: &ErrorContext) {
        log::warn!(
            target: "trackweb::error",
            "WARNING: {} - Operation: {} - Generation: {:?}",
            message,
            context.operation,
            context.generation
        );
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::NetworkError.to_string(), "NETWORK_ERROR");
        assert_eq!(ErrorCode::UpstreamError.to_string(), "UPSTREAM_ERROR");
        assert_eq!(ErrorCode::ValidationError.to_string(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_core_error_severity() {
        assert_eq!(CoreError::validation("empty").severity(), ErrorSeverity::Warning);
        assert_eq!(CoreError::network("refused").severity(), ErrorSeverity::Error);
        assert_eq!(
            CoreError::Config {
                message: "bad".to_string(),
            }
            .severity(),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_retryable() {
        assert!(CoreError::network("reset").is_retryable());
        let timeout = CoreError::Timeout {
            operation: "list".to_string(),
            millis: 5000,
        };
        assert!(timeout.is_retryable());
        assert!(CoreError::upstream(503, "busy").is_retryable());
        assert!(!CoreError::upstream(404, "gone").is_retryable());
        assert!(!CoreError::validation("nothing selected").is_retryable());
    }

    #[test]
    fn test_upstream_details_carry_status() {
        let details = CoreError::upstream(401, "Unauthorized")
            .to_details();
        assert_eq!(details.code, ErrorCode::UpstreamError);
        assert_eq!(details.details.as_ref().unwrap()["status"], 401);
        assert_eq!(details.suggestions.len(), 1);
        assert!(details.message.contains("Unauthorized"));
    }

    #[test]
    fn test_serde_error_becomes_decode() {
        let err: CoreError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::DecodeError);
    }

    #[test]
    fn test_error_context() {
        let context = ErrorContext::new("fetch_page")
            .with_generation(3)
            .with_data("page", serde_json::json!(2));
        assert_eq!(context.operation, "fetch_page");
        assert_eq!(context.generation, Some(3));
        assert_eq!(context.data["page"], 2);
    }
}
