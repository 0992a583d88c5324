//! Common imports for typical client usage.
pub use crate::{
    AssistantClient, CancelHandle, ClientConfig, ClientError, DocumentInfo, HealthStatus,
    QueryStream, StreamCallbacks, StreamEvent, StreamFailure, StreamSummary,
};
