//! File-based client configuration.
//!
//! ```toml
//! base_url = "http://localhost:8080/api"
//! default_model = "gpt-4o"
//! timeout_secs = 300
//! session_cookie = "session=abc123"
//!
//! [headers]
//! X-Client = "lorechat"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::client::ClientError;
use crate::options::TransportOptions;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when the caller does not name one
    pub default_model: Option<String>,

    pub timeout_secs: Option<u64>,

    pub proxy: Option<String>,

    /// Cookie (`name=value`) carrying the backend session
    pub session_cookie: Option<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: None,
            timeout_secs: None,
            proxy: None,
            session_cookie: None,
            headers: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> Result<Option<Self>, ClientError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Self::from_toml_str(&text)
            .map(Some)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ClientError> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn into_transport_options(self) -> TransportOptions {
        let mut options = TransportOptions::new(self.base_url);
        options.timeout = self.timeout_secs.map(Duration::from_secs);
        options.proxy = self.proxy;
        options.session_cookie = self.session_cookie.map(Into::into);
        if !self.headers.is_empty() {
            options = options.with_extra_headers(self.headers);
        }
        options
    }
}
