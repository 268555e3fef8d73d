//! Route modules for the proxy server
//!
//! - proxy: credential-injecting forwarder to the upstream tracker API

pub mod proxy;

pub use proxy::{proxy_get, proxy_post};
