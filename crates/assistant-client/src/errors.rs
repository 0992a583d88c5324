/// Per-frame decoding errors.
///
/// These are non-fatal: the session logs the frame, bumps the skip counter,
/// and keeps reading. They are enumerated (rather than swallowed at the
/// decode site) so tests can assert on exactly why a frame was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Frame payload was not valid JSON.
    #[error("frame payload is not valid JSON: {message}")]
    Malformed { message: String },
    /// Frame payload had no `type` discriminant.
    #[error("frame payload is missing the `type` field")]
    MissingKind,
    /// Frame payload carried a `type` this client does not understand.
    #[error("unrecognized event kind `{kind}`")]
    UnknownKind { kind: String },
    /// A known event kind was missing a required field.
    #[error("`{kind}` event is missing the `{field}` field")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// Terminal failure of a query stream session.
///
/// Exactly one of these ends every session that does not complete normally.
/// All variants except `Cancelled` are also reported to the `on_error`
/// callback as a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    /// Connection, DNS, timeout, or mid-stream read failure.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The backend reported an error, either as an explicit error event or
    /// as a non-success status when opening the stream.
    #[error("server error: {message}")]
    Server { message: String },
    /// The transport closed before a terminal event arrived.
    #[error("stream ended unexpectedly")]
    EndedEarly,
    /// The caller cancelled the session. Never routed to `on_error`.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamFailure {
    /// Creates a transport-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a server-reported failure.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this failure.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty question).
    #[error("validation error: {0}")]
    Validation(String),
    /// Request-level transport failure outside a stream session.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Non-success HTTP status from a non-streaming endpoint.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// Response body from a non-streaming endpoint could not be decoded.
    #[error("decode error: {message}")]
    Decode { message: String },
    /// Terminal failure surfaced from a stream session.
    #[error(transparent)]
    Stream(StreamFailure),
}

impl ClientError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<StreamFailure> for ClientError {
    fn from(value: StreamFailure) -> Self {
        ClientError::Stream(value)
    }
}
