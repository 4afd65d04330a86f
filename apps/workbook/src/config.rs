use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::protocol::{ChunkError, ChunkLimit};
use crate::transport::websocket::{EndpointError, WebSocketOptions, execution_url};

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:4400";
pub const DEFAULT_TERMINAL_ID: &str = "0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("invalid chunk limit: {0}")]
    ChunkLimit(#[from] ChunkError),
}

/// Workbook client configuration, resolved from flags and `WORKBOOK_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosting server; the execution endpoint is derived
    /// from it.
    pub server: String,
    pub terminal_id: String,
    pub chunk_limit: ChunkLimit,
    pub connect_timeout: Option<Duration>,
}

impl Config {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    pub fn with_chunk_limit(mut self, chars: usize) -> Result<Self, ConfigError> {
        self.chunk_limit = ChunkLimit::new(chars)?;
        Ok(self)
    }

    pub fn with_connect_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.connect_timeout = secs.map(Duration::from_secs);
        self
    }

    pub fn with_terminal_id(mut self, id: impl Into<String>) -> Self {
        self.terminal_id = id.into();
        self
    }

    /// The websocket URL runs are submitted to.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        Ok(execution_url(&self.server)?)
    }

    pub fn websocket_options(&self) -> WebSocketOptions {
        WebSocketOptions::default().with_connect_timeout(self.connect_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            terminal_id: DEFAULT_TERMINAL_ID.to_string(),
            chunk_limit: ChunkLimit::default(),
            connect_timeout: None,
        }
    }
}
