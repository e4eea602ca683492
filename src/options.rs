//! Transport options for talking to the chat backend.

use std::collections::HashMap;
use std::time::Duration;

/// A secret string type for sensitive data like session cookies.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// HTTP transport configuration for a [`StreamClient`](crate::client::StreamClient).
///
/// # Example
/// ```rust
/// use lorechat::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new("http://localhost:8080/api")
///     .with_timeout(Duration::from_secs(120))
///     .with_session_cookie("session=abc123");
/// assert_eq!(options.base_url, "http://localhost:8080/api");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL of the backend; `/chat/stream` is appended to it.
    pub base_url: String,

    /// Whole-request timeout. Streams can run long, so unset by default.
    pub timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Cookie (`name=value`) seeded into the cookie store before the first request.
    pub session_cookie: Option<SecretString>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl TransportOptions {
    /// Create transport options pointing at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            proxy: None,
            session_cookie: None,
            extra_headers: None,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set the session cookie.
    pub fn with_session_cookie(mut self, cookie: impl Into<SecretString>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Set extra headers.
    pub fn with_extra_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = Some(headers);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}
