//! Credentials and DataView settings

use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::debounce::DEFAULT_DEBOUNCE;

/// Default Maps API server template
pub const DEFAULT_SERVER_URL: &str = "https://{user}.carto.com";

/// Credentials used to reach the Maps API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub api_key: String,
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

impl Credentials {
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            server_url: default_server_url(),
        }
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    /// Server URL with the `{user}` placeholder resolved
    pub fn resolved_server_url(&self) -> String {
        self.server_url.replace("{user}", &self.username)
    }
}

static DEFAULT_CREDENTIALS: Lazy<RwLock<Option<Credentials>>> = Lazy::new(|| RwLock::new(None));

/// Set the process-wide fallback credentials
pub fn set_default_credentials(credentials: Credentials) {
    *DEFAULT_CREDENTIALS.write() = Some(credentials);
}

/// Clear the process-wide fallback credentials
pub fn clear_default_credentials() {
    *DEFAULT_CREDENTIALS.write() = None;
}

/// Current process-wide fallback credentials
pub fn default_credentials() -> Option<Credentials> {
    DEFAULT_CREDENTIALS.read().clone()
}

/// Explicit credentials if given, otherwise the process-wide default
pub fn resolve_credentials(explicit: Option<&Credentials>) -> Option<Credentials> {
    explicit.cloned().or_else(default_credentials)
}

/// Per-DataView runtime settings
#[derive(Debug, Clone)]
pub struct DataViewSettings {
    /// Quiet period before a `dataUpdate` is emitted after option changes
    pub debounce: Duration,
}

impl Default for DataViewSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl DataViewSettings {
    pub fn with_debounce_ms(ms: Option<u64>) -> Self {
        Self {
            debounce: ms.map(Duration::from_millis).unwrap_or(DEFAULT_DEBOUNCE),
        }
    }
}
