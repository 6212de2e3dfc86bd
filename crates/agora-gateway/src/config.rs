//! Gateway configuration.
//!
//! Every field has a serde default, so a partial document (or none at all)
//! yields a working configuration. [`GatewayConfig::from_env`] layers the
//! process environment over those defaults.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the HTTP edge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Socket address to bind.
    #[serde(default = "defaults::listen_addr")]
    pub listen_addr: String,

    /// RocksDB directory.
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,

    /// Origins allowed by CORS. `*` allows any origin.
    #[serde(default = "defaults::cors_origins")]
    pub cors_origins: Vec<String>,

    /// Largest accepted REST body.
    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: usize,

    /// Upper bound on a REST request, in seconds. WebSockets are exempt.
    #[serde(default = "defaults::request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

mod defaults {
    pub fn listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    pub fn data_dir() -> String {
        "/data/agora".to_string()
    }

    pub fn cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }

    pub const fn max_body_bytes() -> usize {
        256 * 1024
    }

    // Longer than the actor's own reply timeout, so actor timeouts surface
    // as 504 rather than being cut off by the layer.
    pub const fn request_timeout_seconds() -> u64 {
        60
    }
}

impl GatewayConfig {
    /// Defaults overridden by `LISTEN_ADDR`, `DATA_DIR` and `CORS_ORIGINS`
    /// (comma-separated).
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            config.data_dir = dir;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            config.cors_origins = parse_origins(&origins);
        }
        config
    }

    /// The REST timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: defaults::listen_addr(),
            data_dir: defaults::data_dir(),
            cors_origins: defaults::cors_origins(),
            max_body_bytes: defaults::max_body_bytes(),
            request_timeout_seconds: defaults::request_timeout_seconds(),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(ToString::to_string)
        .collect()
}
