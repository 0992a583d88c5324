use std::pin::Pin;

use futures::TryStreamExt as _;
use reqwest::header;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ClientError, StreamFailure};

/// JSON body of a streaming query request.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryRequest {
    /// The user's question.
    pub question: String,
}

impl QueryRequest {
    /// Creates a query request.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
        }
    }
}

/// Ordered byte chunks read from a streaming response body.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamFailure>> + Send + 'static>>;

/// Source of raw bytes for a stream session.
///
/// The session and the frame assembler are agnostic to which transport
/// produced the bytes; tests substitute in-memory streams, and alternative
/// transports (a native EventSource binding, a unix socket) slot in without
/// touching the framing or dispatch logic.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    /// Issues the streaming request and returns the response byte stream.
    async fn open(&self, request: &QueryRequest) -> Result<ByteStream, StreamFailure>;
}

/// HTTP transport for the assistant backend.
///
/// POSTs the query as JSON to `{base}/query` with
/// `Accept: text/event-stream` and the optional `X-API-Key` header.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Creates a transport from client configuration.
    ///
    /// Only a connect timeout is set; the response body is read for as long
    /// as the stream lives.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, request: &QueryRequest) -> Result<ByteStream, StreamFailure> {
        debug!(url = %self.config.query_url(), "opening query stream");
        let mut http_req = self
            .client
            .post(self.config.query_url())
            .header(header::ACCEPT, "text/event-stream")
            .json(request);
        if let Some(api_key) = &self.config.api_key {
            http_req = http_req.header("X-API-Key", api_key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| StreamFailure::transport(format!("query request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StreamFailure::server(format!(
                "query request failed with status {status}: {body}"
            )));
        }

        let bytes = response
            .bytes_stream()
            .map_err(|e| StreamFailure::transport(format!("stream read failed: {e}")));
        Ok(Box::pin(bytes))
    }
}
