use crate::errors::DecodeError;

/// Decoded event carried by one frame of the query stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A pipeline stage update (`planning`, `retrieving`, `verifying`, ...).
    Progress {
        stage: String,
        message: String,
        /// Full decoded event object, for callers that want fields beyond
        /// `stage`/`message` (iteration counts, context counts, ...).
        raw: serde_json::Value,
    },
    /// Terminal success with the backend's result object.
    Complete { result: serde_json::Value },
    /// Terminal failure reported by the backend.
    Error { message: String },
}

/// Decodes one frame payload into a typed event.
///
/// The `type` field selects the variant. One bad frame must not abort an
/// otherwise healthy stream, so every failure here is a skippable
/// `DecodeError` rather than a session-terminating condition.
pub fn decode_event(payload: &str) -> Result<StreamEvent, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| DecodeError::Malformed {
            message: e.to_string(),
        })?;
    let Some(kind) = value.get("type").and_then(|v| v.as_str()) else {
        return Err(DecodeError::MissingKind);
    };
    match kind {
        "progress" => {
            let stage = require_str(&value, "progress", "stage")?;
            let message = require_str(&value, "progress", "message")?;
            Ok(StreamEvent::Progress {
                stage,
                message,
                raw: value,
            })
        }
        "complete" => match value.get("result") {
            Some(result) => Ok(StreamEvent::Complete {
                result: result.clone(),
            }),
            None => Err(DecodeError::MissingField {
                kind: "complete",
                field: "result",
            }),
        },
        "error" => {
            let message = require_str(&value, "error", "message")?;
            Ok(StreamEvent::Error { message })
        }
        other => Err(DecodeError::UnknownKind {
            kind: other.to_string(),
        }),
    }
}

fn require_str(
    value: &serde_json::Value,
    kind: &'static str,
    field: &'static str,
) -> Result<String, DecodeError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
        .ok_or(DecodeError::MissingField { kind, field })
}
