//! HTTP client construction for the chat backend.
//!
//! One `reqwest::Client` is built per [`StreamClient`](crate::client::StreamClient)
//! and carries a cookie store, so session credentials ride along with every request.

use reqwest::cookie::Jar;
use reqwest::{Client, RequestBuilder, Url};
use std::collections::HashMap;
use std::sync::Arc;

use crate::client::ClientError;
use crate::options::TransportOptions;

const STREAM_PATH: &str = "chat/stream";

/// Resolve the streaming endpoint, `{base}/chat/stream`.
///
/// # Example
/// ```
/// use lorechat::http::chat_stream_url;
///
/// let url = chat_stream_url("http://localhost:8080/api/").unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8080/api/chat/stream");
/// ```
pub fn chat_stream_url(base_url: &str) -> Result<Url, ClientError> {
    let url = format!("{}/{}", base_url.trim_end_matches('/'), STREAM_PATH);
    Url::parse(&url).map_err(|e| ClientError::Config(format!("invalid base URL {base_url:?}: {e}")))
}

/// Build a configured HTTP client from transport options.
///
/// This applies timeouts and proxies, and seeds the cookie store with the
/// session cookie when one is configured.
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url:?}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder = match &transport_options.session_cookie {
        Some(cookie) => {
            let base = &transport_options.base_url;
            let url = Url::parse(base)
                .map_err(|e| ClientError::Config(format!("invalid base URL {base:?}: {e}")))?;
            let jar = Jar::default();
            jar.add_cookie_str(cookie.expose_secret(), &url);
            builder.cookie_provider(Arc::new(jar))
        }
        None => builder.cookie_store(true),
    };

    Ok(builder.build()?)
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}
