use std::sync::Arc;

use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::session::{QueryStream, StreamCallbacks, spawn_session};
use crate::transport::{HttpTransport, QueryRequest, StreamTransport};

/// Document metadata returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub title: String,
    pub status: String,
}

/// Health-check response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

/// Client for the assistant backend.
///
/// Streaming queries go through an injectable `StreamTransport`; the
/// document-upload and health endpoints are plain request/response calls.
pub struct AssistantClient {
    transport: Arc<dyn StreamTransport>,
    http: reqwest::Client,
    config: ClientConfig,
}

impl AssistantClient {
    /// Creates a client that talks HTTP to the configured backend.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = Arc::new(HttpTransport::new(config.clone())?);
        Self::with_transport(config, transport)
    }

    /// Creates a client from `ASSISTANT_API_BASE` / `ASSISTANT_API_KEY`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Creates a client with a caller-supplied stream transport.
    ///
    /// Non-streaming endpoints still use HTTP against `config.base_url`.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            transport,
            http,
            config,
        })
    }

    /// Starts a streaming query session.
    ///
    /// Events are dispatched to `callbacks` in arrival order until a
    /// terminal event, transport closure, or cancellation via the returned
    /// handle. Sessions are independent: each call owns its own buffer and
    /// cancellation token.
    pub fn stream_query(
        &self,
        question: impl Into<String>,
        callbacks: StreamCallbacks,
    ) -> Result<QueryStream, ClientError> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(ClientError::Validation("question must not be empty".into()));
        }
        debug!(question_len = question.len(), "starting query session");
        Ok(spawn_session(
            self.transport.clone(),
            QueryRequest::new(question),
            callbacks,
        ))
    }

    /// Uploads a document for ingestion.
    pub async fn upload_document(
        &self,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<DocumentInfo, ClientError> {
        let file_name = file_name.into();
        if file_name.trim().is_empty() {
            return Err(ClientError::Validation(
                "file_name must not be empty".into(),
            ));
        }
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| ClientError::Validation(format!("invalid upload part: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        debug!(%file_name, "uploading document");
        let response = self
            .authorize(self.http.post(self.config.upload_url()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("upload request failed: {e}")))?;
        read_json(response, "upload").await
    }

    /// Checks backend health.
    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = self
            .authorize(self.http.get(self.config.health_url()))
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("health request failed: {e}")))?;
        read_json(response, "health").await
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(api_key) => request.header("X-API-Key", api_key),
            None => request,
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: format!("{endpoint} request failed: {body}"),
        });
    }
    response
        .json()
        .await
        .map_err(|e| ClientError::decode(format!("invalid {endpoint} response: {e}")))
}
