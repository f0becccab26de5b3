//! Raw inbound envelopes as delivered by the WhatsApp bridge.
//!
//! Decoding is lenient: every field is optional and wrongly typed
//! fields fall back to their defaults, so a single odd message can never take
//! down a whole batch.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MessageError;

/// Identifies one message inside one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Conversation target: a user JID for direct chats, a group JID for groups.
    #[serde(default)]
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub id: String,
    /// Author inside a group conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

impl MessageKey {
    pub fn from_value(value: &Value) -> Self {
        Self {
            remote_jid: str_field(value, "remoteJid").unwrap_or_default(),
            from_me: value.get("fromMe").and_then(Value::as_bool).unwrap_or(false),
            id: str_field(value, "id").unwrap_or_default(),
            participant: str_field(value, "participant").filter(|p| !p.is_empty()),
        }
    }
}

/// One inbound message event (Baileys `WebMessageInfo` JSON).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    pub key: MessageKey,
    /// Untyped content; classified later by [`crate::content`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    /// Seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
}

impl RawEnvelope {
    /// Decode an envelope from arbitrary JSON. Never fails.
    pub fn from_value(value: &Value) -> Self {
        Self {
            key: value.get("key").map(MessageKey::from_value).unwrap_or_default(),
            message: value.get("message").filter(|m| !m.is_null()).cloned(),
            message_timestamp: value.get("messageTimestamp").and_then(timestamp_secs),
            push_name: str_field(value, "pushName"),
        }
    }
}

impl<'de> Deserialize<'de> for RawEnvelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// A `messages.upsert` event batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertBatch {
    /// `"notify"` for live messages, `"append"` for history sync.
    pub kind: String,
    pub messages: Vec<RawEnvelope>,
}

impl UpsertBatch {
    pub fn parse(bytes: &[u8]) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MessageError::MalformedBatch("expected a JSON object".to_string()))?;
        let messages = obj
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| MessageError::MalformedBatch("missing `messages` array".to_string()))?
            .iter()
            .map(RawEnvelope::from_value)
            .collect();
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("notify")
            .to_string();
        Ok(Self { kind, messages })
    }

    /// Live messages (as opposed to history replays).
    pub fn is_notify(&self) -> bool {
        self.kind == "notify"
    }
}

pub(crate) fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Timestamps arrive as numbers, numeric strings, or protobuf `Long` objects.
fn timestamp_secs(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(o) => o.get("low").and_then(Value::as_i64),
        _ => None,
    }
}
