//! Error types for trackweb-config

use crate::{ENV_PROXY_URL, ENV_UPSTREAM_PASSWORD, ENV_UPSTREAM_URL, ENV_UPSTREAM_USERNAME};
use serde::Serialize;
use thiserror::Error;

/// Operator-facing report of a configuration problem
#[derive(Debug, Clone, Serialize)]
pub struct ConfigErrorDetails {
    /// SCREAMING_SNAKE_CASE code, e.g. `INVALID_VALUE`
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Environment variable that can supply the field instead of the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_var: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl std::fmt::Display for ConfigErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(field) = &self.field {
            write!(f, "\nField: {}", field)?;
        }
        if let Some(var) = self.env_var {
            write!(f, "\nEnvironment override: {}", var)?;
        }
        for suggestion in &self.suggestions {
            write!(f, "\n  - {}", suggestion)?;
        }
        Ok(())
    }
}

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid YAML: {message}")]
    InvalidYaml { message: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cannot read config file: {message}")]
    IoError { message: String },
}

impl ConfigError {
    /// Shorthand for a field validation failure
    pub fn invalid(field: &str, reason: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "FILE_NOT_FOUND",
            ConfigError::InvalidYaml { .. } => "INVALID_YAML",
            ConfigError::InvalidValue { .. } => "INVALID_VALUE",
            ConfigError::IoError { .. } => "IO_ERROR",
        }
    }

    /// A missing file falls back to defaults; everything else stops start-up
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ConfigError::FileNotFound { .. })
    }

    /// Environment variable that overrides the failing field, if any
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            ConfigError::InvalidValue { field, .. } => match field.as_str() {
                "upstream.base_url" => Some(ENV_UPSTREAM_URL),
                "upstream.auth.username" => Some(ENV_UPSTREAM_USERNAME),
                "upstream.auth.password" => Some(ENV_UPSTREAM_PASSWORD),
                "client.proxy_url" => Some(ENV_PROXY_URL),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn to_details(&self) -> ConfigErrorDetails {
        let mut suggestions = Vec::new();
        let mut field = None;
        match self {
            ConfigError::FileNotFound { path } => {
                suggestions.push(format!(
                    "Create one with `trackweb --config {} init-config`.",
                    path
                ));
            }
            ConfigError::InvalidYaml { .. } => {
                suggestions.push(
                    "Compare the file with a fresh `trackweb --config <file> init-config`."
                        .to_string(),
                );
            }
            ConfigError::InvalidValue { field: name, .. } => {
                field = Some(name.clone());
            }
            ConfigError::IoError { .. } => {
                suggestions.push("Check the file permissions.".to_string());
            }
        }
        ConfigErrorDetails {
            code: self.code(),
            message: self.to_string(),
            field,
            env_var: self.env_var(),
            suggestions,
        }
    }
}

/// Result type with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
