use thiserror::Error;

/// Errors decoding an inbound event batch.
///
/// Individual messages never fail to decode; only the outer batch can be
/// rejected (not JSON, or not an object with a `messages` array).
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("malformed event batch: {0}")]
    MalformedBatch(String),
}
