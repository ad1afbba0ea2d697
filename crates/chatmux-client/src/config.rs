//! Client configuration loaded from environment variables.
//!
//! All settings have defaults that target a backend on localhost, so the
//! client starts with zero configuration for local development.

use std::time::Duration;

use chatmux_shared::constants::{
    DEFAULT_API_BASE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HTTP_TIMEOUT_SECS,
};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the REST API (history, upload, rooms, users).
    /// Env: `CHATMUX_API_BASE`
    /// Default: `http://localhost:8080`
    pub api_base: String,

    /// Base URL of the websocket endpoint.
    /// Env: `CHATMUX_WS_BASE`
    /// Default: `api_base` with `http(s)://` replaced by `ws(s)://`
    pub ws_base: String,

    /// Capacity of the channels between the engine and the transport task.
    /// Env: `CHATMUX_CHANNEL_CAPACITY`
    /// Default: `256`
    pub channel_capacity: usize,

    /// Timeout applied to every REST request.
    /// Env: `CHATMUX_HTTP_TIMEOUT_SECS`
    /// Default: `30`
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            ws_base: derive_ws_base(DEFAULT_API_BASE),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("CHATMUX_API_BASE") {
            config = config.with_api_base(base);
        }

        if let Ok(base) = std::env::var("CHATMUX_WS_BASE") {
            config.ws_base = base;
        }

        if let Ok(val) = std::env::var("CHATMUX_CHANNEL_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.channel_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid CHATMUX_CHANNEL_CAPACITY, using default"),
            }
        }

        if let Ok(val) = std::env::var("CHATMUX_HTTP_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.http_timeout = Duration::from_secs(secs),
                Err(_) => tracing::warn!(value = %val, "Invalid CHATMUX_HTTP_TIMEOUT_SECS, using default"),
            }
        }

        config
    }

    /// Point at another REST base; the websocket base follows it.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        self.ws_base = derive_ws_base(&api_base);
        self.api_base = api_base;
        self
    }
}

fn derive_ws_base(api_base: &str) -> String {
    if let Some(rest) = api_base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_base.to_string()
    }
}
