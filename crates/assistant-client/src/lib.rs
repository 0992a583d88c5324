//! Client for the AI Knowledge Assistant backend.
//!
//! The core of this crate is the streaming query session: it consumes a
//! server-sent-events response body chunk by chunk, reassembles frames
//! across arbitrary chunk boundaries, decodes each frame as a typed event,
//! and dispatches it to caller-supplied callbacks in arrival order, with
//! cooperative mid-stream cancellation. Document upload and health checks
//! are thin request/response companions.
//!
//! # Streaming a query
//!
//! ```no_run
//! use assistant_client::{AssistantClient, ClientConfig, StreamCallbacks};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), assistant_client::ClientError> {
//! let client = AssistantClient::new(ClientConfig::from_env()?)?;
//! let stream = client.stream_query(
//!     "What does the handbook say about onboarding?",
//!     StreamCallbacks::new(
//!         |stage, message, _raw| eprintln!("[{stage}] {message}"),
//!         |result| println!("{result}"),
//!         |error| eprintln!("query failed: {error}"),
//!     ),
//! )?;
//! let summary = stream.finish().await?;
//! eprintln!("{} events dispatched", summary.events_dispatched);
//! # Ok(())
//! # }
//! ```

/// Client entry point and non-streaming endpoint types.
pub mod client;
/// Backend endpoint configuration.
pub mod config;
/// Public error types used by the client API.
pub mod errors;
/// Typed stream events and frame-payload decoding.
pub mod event;
/// Common imports for typical usage.
pub mod prelude;
/// Stream session lifecycle, callbacks, and cancellation.
pub mod session;
/// Frame reassembly across chunk boundaries.
pub mod sse;
/// Byte-stream transport seam and the HTTP implementation.
pub mod transport;

pub use client::{AssistantClient, DocumentInfo, HealthStatus};
pub use config::ClientConfig;
pub use errors::{ClientError, DecodeError, StreamFailure};
pub use event::{StreamEvent, decode_event};
pub use session::{CancelHandle, QueryStream, StreamCallbacks, StreamSummary};
pub use sse::FrameAssembler;
pub use transport::{ByteStream, HttpTransport, QueryRequest, StreamTransport};
