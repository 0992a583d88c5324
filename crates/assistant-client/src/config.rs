use std::time::Duration;

use crate::errors::ClientError;

/// Configuration for the assistant backend client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the assistant backend.
    ///
    /// Useful for pointing at proxies or local test servers.
    pub base_url: String,
    /// Optional API key sent as the `X-API-Key` header.
    pub api_key: Option<String>,
    /// Timeout for establishing connections.
    ///
    /// No overall request timeout is set: query streams are long-lived and
    /// deadlines are imposed by cancelling the session.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with sensible defaults for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `ASSISTANT_API_BASE` and `ASSISTANT_API_KEY`.
    ///
    /// The base URL defaults to `http://localhost:8000` when unset; the API
    /// key stays `None` when unset or blank.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("ASSISTANT_API_BASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "http://localhost:8000".to_string());
        let api_key = std::env::var("ASSISTANT_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Ok(Self::new(base_url).with_api_key(api_key))
    }

    /// Sets the API key for authenticated deployments.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub(crate) fn query_url(&self) -> String {
        format!("{}/query", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn upload_url(&self) -> String {
        format!("{}/documents/upload", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }
}
