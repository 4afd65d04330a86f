use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Path of the execution endpoint relative to the hosting server.
pub const EXECUTION_PATH: &str = "/echo";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
}

/// Derives the websocket execution endpoint from the server base URL.
///
/// `https://host` maps to `wss://host/echo`, `http://host` to
/// `ws://host/echo`. A bare `host:port` is treated as plain http. Any path,
/// query or fragment on the base is replaced.
pub fn execution_url(base: &str) -> Result<Url, EndpointError> {
    let trimmed = base.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|err| EndpointError::InvalidUrl {
        url: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    if url.host_str().is_none() {
        return Err(EndpointError::InvalidUrl {
            url: trimmed.to_string(),
            reason: "missing host".into(),
        });
    }

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| EndpointError::UnsupportedScheme(scheme.to_string()))?;
    url.set_path(EXECUTION_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Connection options for [`super::WebSocketConnector`].
#[derive(Debug, Clone, Default)]
pub struct WebSocketOptions {
    /// Bound on the connect attempt. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl WebSocketOptions {
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
