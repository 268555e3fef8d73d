//! Configuration management for trackweb
//!
//! This module handles loading, validation, and environment overrides of
//! trackweb configuration from YAML files.

pub mod error;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use error::{ConfigError, ConfigErrorDetails, ConfigResult};

/// Environment variable overriding `upstream.base_url`
pub const ENV_UPSTREAM_URL: &str = "TRACKWEB_UPSTREAM_URL";
/// Environment variable overriding the upstream username
pub const ENV_UPSTREAM_USERNAME: &str = "TRACKWEB_UPSTREAM_USERNAME";
/// Environment variable overriding the upstream password
pub const ENV_UPSTREAM_PASSWORD: &str = "TRACKWEB_UPSTREAM_PASSWORD";
/// Environment variable overriding `client.proxy_url`
pub const ENV_PROXY_URL: &str = "TRACKWEB_PROXY_URL";

const MAX_PAGE_SIZE: usize = 500;

// ==================== Configuration Types ====================

/// Proxy server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed to call the proxy from a browser (empty disables CORS)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

/// Basic authentication credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// Upstream business system settings, used by the proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL every proxied path is appended to
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    /// Resource path of the transaction tracker
    #[serde(default = "default_resource_path")]
    pub resource_path: String,
    /// Credentials injected as `Authorization: Basic`
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Timeout for one forwarded request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            resource_path: default_resource_path(),
            auth: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:9000/api".to_string()
}

fn default_resource_path() -> String {
    "AribaBetter/TransactionTracker".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Dashboard client settings (how the data service reaches the proxy)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the proxy server
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    /// Route of the proxy endpoint on that server
    #[serde(default = "default_proxy_route")]
    pub proxy_route: String,
    /// Timeout for list/detail requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Timeout for each reprocess request of a batch
    #[serde(default = "default_timeout_secs")]
    pub reprocess_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            proxy_route: default_proxy_route(),
            timeout_secs: default_timeout_secs(),
            reprocess_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_proxy_route() -> String {
    "/api/proxy".to_string()
}

/// Pagination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter: debug, info, warn, error or a module-level directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Proxy server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream system settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Dashboard client settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Pagination settings
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: PathBuf) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::IoError {
                message: e.to_string(),
            },
        })?;

        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file, falling back to defaults when it does not exist
    ///
    /// The non-fatal error is handed back so the caller can report it
    /// once logging is set up.
    pub fn load_or_default(path: PathBuf) -> ConfigResult<(Self, Option<ConfigError>)> {
        match Self::load(path) {
            Ok(config) => Ok((config, None)),
            Err(e) if !e.is_fatal() => Ok((Config::default(), Some(e))),
            Err(e) => Err(e),
        }
    }

    /// Parse configuration from YAML text without validating it
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        // An empty document is null in YAML; treat it as all defaults
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidYaml {
            message: e.to_string(),
        })
    }

    /// Overlay settings from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overlay settings from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_UPSTREAM_URL) {
            self.upstream.base_url = url;
        }
        if let Some(url) = non_empty(ENV_PROXY_URL) {
            self.client.proxy_url = url;
        }
        match (non_empty(ENV_UPSTREAM_USERNAME), lookup(ENV_UPSTREAM_PASSWORD)) {
            (Some(username), Some(password)) => {
                self.upstream.auth = Some(AuthConfig { username, password });
            }
            (Some(username), None) => {
                let password = self
                    .upstream
                    .auth
                    .take()
                    .map(|a| a.password)
                    .unwrap_or_default();
                self.upstream.auth = Some(AuthConfig { username, password });
            }
            (None, Some(password)) => {
                if let Some(auth) = self.upstream.auth.as_mut() {
                    auth.password = password;
                }
            }
            (None, None) => {}
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Port must be greater than 0"));
        }

        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("upstream.base_url", "Upstream URL must not be empty"));
        }
        if !self.upstream.base_url.starts_with("http://") {
            return Err(ConfigError::invalid(
                "upstream.base_url",
                "Upstream URL must use the http:// scheme",
            ));
        }
        if self.upstream.resource_path.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid(
                "upstream.resource_path",
                "Resource path must not be empty",
            ));
        }
        if let Some(auth) = &self.upstream.auth {
            if auth.username.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "upstream.auth.username",
                    "Username must not be empty when auth is configured",
                ));
            }
        }

        if !self.client.proxy_url.starts_with("http://") {
            return Err(ConfigError::invalid(
                "client.proxy_url",
                "Proxy URL must use the http:// scheme",
            ));
        }
        if !self.client.proxy_route.starts_with('/') {
            return Err(ConfigError::invalid("client.proxy_route", "Route must start with '/'"));
        }

        for (field, secs) in [
            ("upstream.timeout_secs", self.upstream.timeout_secs),
            ("client.timeout_secs", self.client.timeout_secs),
            ("client.reprocess_timeout_secs", self.client.reprocess_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::invalid(field, "Timeout must be greater than 0"));
            }
        }

        if self.pagination.page_size == 0 || self.pagination.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::invalid(
                "pagination.page_size",
                "Page size must be between 1 and 500",
            ));
        }

        Ok(())
    }

    /// Generate a default configuration file
    pub fn generate_default() -> &'static str {
        include_str!("../templates/default_config.yaml")
    }

    /// Full URL of the proxy endpoint
    pub fn proxy_endpoint(&self) -> String {
        format!(
            "{}{}",
            self.client.proxy_url.trim_end_matches('/'),
            self.client.proxy_route
        )
    }

    /// Listen address of the proxy server
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ==================== Tests ====================
