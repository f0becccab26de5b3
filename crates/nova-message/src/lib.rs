//! Inbound message model for the bot.
//!
//! Transport payloads arrive as Baileys-shaped JSON. `raw` decodes the envelope
//! leniently, `content` classifies the payload into a closed set of content
//! kinds, and `normalize` turns the whole thing into a [`NormalizedMessage`]
//! the dispatcher can match against. `outbound` holds what handlers send back.

pub mod content;
pub mod error;
pub mod normalize;
pub mod outbound;
pub mod raw;

pub use content::{ContextInfo, MessageContent, MessageType};
pub use error::MessageError;
pub use normalize::{normalize, NormalizeContext, NormalizedMessage};
pub use outbound::{OutgoingContent, Presence};
pub use raw::{MessageKey, RawEnvelope, UpsertBatch};
