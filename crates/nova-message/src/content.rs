//! Closed classification of message content kinds.
//!
//! A raw `message` object carries exactly one populated content field
//! (`conversation`, `imageMessage`, …). [`classify`] picks it with a fixed
//! priority table and decodes it into [`MessageContent`]; [`MessageContent::body`]
//! is a total match over the variants, so adding a kind without a body rule
//! does not compile.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::raw::str_field;

/// Known content keys, in classification priority order.
const KNOWN_KINDS: &[&str] = &[
    "conversation",
    "extendedTextMessage",
    "imageMessage",
    "videoMessage",
    "audioMessage",
    "documentMessage",
    "stickerMessage",
    "buttonsResponseMessage",
    "templateButtonReplyMessage",
    "listResponseMessage",
    "interactiveResponseMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
];

/// Keys that sit next to the real content and must never be picked as the kind.
const IGNORED_KEYS: &[&str] = &["messageContextInfo", "senderKeyDistributionMessage"];

const VIEW_ONCE_KINDS: &[&str] = &[
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
];

/// Tag identifying the underlying content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Conversation,
    ExtendedText,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    ButtonsResponse,
    TemplateButtonReply,
    ListResponse,
    InteractiveResponse,
    /// A view-once wrapper that could not be unwrapped (nested or empty).
    ViewOnce,
    /// Any other content key the transport delivered.
    Other(String),
    /// No content at all, or a payload that is not an object.
    Empty,
}

impl MessageType {
    /// The transport's name for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Conversation => "conversation",
            MessageType::ExtendedText => "extendedTextMessage",
            MessageType::Image => "imageMessage",
            MessageType::Video => "videoMessage",
            MessageType::Audio => "audioMessage",
            MessageType::Document => "documentMessage",
            MessageType::Sticker => "stickerMessage",
            MessageType::ButtonsResponse => "buttonsResponseMessage",
            MessageType::TemplateButtonReply => "templateButtonReplyMessage",
            MessageType::ListResponse => "listResponseMessage",
            MessageType::InteractiveResponse => "interactiveResponseMessage",
            MessageType::ViewOnce => "viewOnceMessage",
            MessageType::Other(kind) => kind,
            MessageType::Empty => "empty",
        }
    }

}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextContent {
    pub text: Option<String>,
}

/// Image, video, audio and sticker payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaContent {
    pub caption: Option<String>,
    pub mimetype: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentContent {
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub mimetype: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ButtonsResponse {
    pub selected_button_id: Option<String>,
    pub selected_display_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateButtonReply {
    pub selected_id: Option<String>,
    pub selected_display_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SingleSelectReply {
    pub selected_row_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListResponse {
    pub title: Option<String>,
    pub single_select_reply: Option<SingleSelectReply>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeFlowResponse {
    pub name: Option<String>,
    pub params_json: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InteractiveResponse {
    pub native_flow_response_message: Option<NativeFlowResponse>,
}

/// Decoded content of one message, one variant per supported kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MessageContent {
    Conversation { text: String },
    ExtendedText(TextContent),
    Image(MediaContent),
    Video(MediaContent),
    Audio(MediaContent),
    Document(DocumentContent),
    Sticker(MediaContent),
    ButtonsResponse(ButtonsResponse),
    TemplateButtonReply(TemplateButtonReply),
    ListResponse(ListResponse),
    InteractiveResponse(InteractiveResponse),
    ViewOnce,
    Other { name: String, payload: Value },
}

impl MessageContent {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageContent::Conversation { .. } => MessageType::Conversation,
            MessageContent::ExtendedText(_) => MessageType::ExtendedText,
            MessageContent::Image(_) => MessageType::Image,
            MessageContent::Video(_) => MessageType::Video,
            MessageContent::Audio(_) => MessageType::Audio,
            MessageContent::Document(_) => MessageType::Document,
            MessageContent::Sticker(_) => MessageType::Sticker,
            MessageContent::ButtonsResponse(_) => MessageType::ButtonsResponse,
            MessageContent::TemplateButtonReply(_) => MessageType::TemplateButtonReply,
            MessageContent::ListResponse(_) => MessageType::ListResponse,
            MessageContent::InteractiveResponse(_) => MessageType::InteractiveResponse,
            MessageContent::ViewOnce => MessageType::ViewOnce,
            MessageContent::Other { name, .. } => MessageType::Other(name.clone()),
        }
    }

    /// Plain-text body of the content; empty when the kind carries no text.
    pub fn body(&self) -> String {
        let text = match self {
            MessageContent::Conversation { text } => Some(text.as_str()),
            MessageContent::ExtendedText(t) => t.text.as_deref(),
            MessageContent::Image(m)
            | MessageContent::Video(m)
            | MessageContent::Audio(m)
            | MessageContent::Sticker(m) => m.caption.as_deref(),
            MessageContent::Document(d) => d.caption.as_deref().or(d.file_name.as_deref()),
            MessageContent::ButtonsResponse(b) => b.selected_button_id.as_deref(),
            MessageContent::TemplateButtonReply(t) => t.selected_id.as_deref(),
            MessageContent::ListResponse(l) => l
                .single_select_reply
                .as_ref()
                .and_then(|r| r.selected_row_id.as_deref())
                .or(l.title.as_deref()),
            MessageContent::InteractiveResponse(i) => i
                .native_flow_response_message
                .as_ref()
                .and_then(|n| n.params_json.as_deref()),
            MessageContent::ViewOnce => None,
            MessageContent::Other { payload, .. } => return scan_text(payload),
        };
        text.unwrap_or_default().to_string()
    }
}

/// Best-effort text for kinds without a dedicated rule.
fn scan_text(payload: &Value) -> String {
    if let Some(s) = payload.as_str() {
        return s.to_string();
    }
    ["text", "caption", "body"]
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Reply/mention metadata attached to most content kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextInfo {
    /// Id of the quoted message.
    pub stanza_id: Option<String>,
    /// Author of the quoted message.
    pub participant: Option<String>,
    /// Explicitly mentioned identities, in payload order.
    pub mentioned: Vec<String>,
    pub quoted_message: Option<Value>,
}

impl ContextInfo {
    pub fn from_payload(payload: &Value) -> Self {
        let Some(ctx) = payload.get("contextInfo").filter(|c| c.is_object()) else {
            return Self::default();
        };
        let mentioned = match ctx.get("mentionedJid") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        };
        Self {
            stanza_id: str_field(ctx, "stanzaId").filter(|s| !s.is_empty()),
            participant: str_field(ctx, "participant").filter(|s| !s.is_empty()),
            mentioned,
            quoted_message: ctx
                .get("quotedMessage")
                .filter(|q| q.as_object().is_some_and(|o| !o.is_empty()))
                .cloned(),
        }
    }
}

/// Result of classifying a raw `message` object.
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub content: MessageContent,
    /// Payload of the selected content field (after any view-once unwrap).
    pub payload: Value,
    /// One view-once wrapper was removed to reach `content`.
    pub view_once: bool,
}

/// Classify a raw `message` object. Returns `None` when it holds no content.
///
/// Exactly one level of view-once wrapping is removed; a wrapper found inside
/// a wrapper is reported as [`MessageContent::ViewOnce`].
pub fn classify(message: &Value) -> Option<Classified> {
    let (kind, payload) = select_kind(message)?;
    if !VIEW_ONCE_KINDS.contains(&kind) {
        return Some(Classified {
            content: decode(kind, payload),
            payload: payload.clone(),
            view_once: false,
        });
    }

    match payload.get("message").and_then(select_kind) {
        Some((inner_kind, inner_payload)) => Some(Classified {
            content: decode(inner_kind, inner_payload),
            payload: inner_payload.clone(),
            view_once: true,
        }),
        None => Some(Classified {
            content: MessageContent::ViewOnce,
            payload: payload.clone(),
            view_once: true,
        }),
    }
}

fn select_kind(message: &Value) -> Option<(&str, &Value)> {
    let obj = message.as_object()?;
    if let Some(found) = KNOWN_KINDS
        .iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()).map(|v| (*k, v)))
    {
        return Some(found);
    }
    obj.iter()
        .filter(|(_, v)| !v.is_null())
        .find(|(k, _)| {
            !IGNORED_KEYS.contains(&k.as_str())
                && (k.as_str() == "conversation" || k.ends_with("Message"))
        })
        .map(|(k, v)| (k.as_str(), v))
}

fn decode(kind: &str, payload: &Value) -> MessageContent {
    match kind {
        "conversation" => match payload.as_str() {
            Some(text) => MessageContent::Conversation {
                text: text.to_string(),
            },
            None => other(kind, payload),
        },
        "extendedTextMessage" => decode_as(kind, payload, MessageContent::ExtendedText),
        "imageMessage" => decode_as(kind, payload, MessageContent::Image),
        "videoMessage" => decode_as(kind, payload, MessageContent::Video),
        "audioMessage" => decode_as(kind, payload, MessageContent::Audio),
        "documentMessage" => decode_as(kind, payload, MessageContent::Document),
        "stickerMessage" => decode_as(kind, payload, MessageContent::Sticker),
        "buttonsResponseMessage" => decode_as(kind, payload, MessageContent::ButtonsResponse),
        "templateButtonReplyMessage" => {
            decode_as(kind, payload, MessageContent::TemplateButtonReply)
        }
        "listResponseMessage" => decode_as(kind, payload, MessageContent::ListResponse),
        "interactiveResponseMessage" => {
            decode_as(kind, payload, MessageContent::InteractiveResponse)
        }
        k if VIEW_ONCE_KINDS.contains(&k) => MessageContent::ViewOnce,
        _ => other(kind, payload),
    }
}

fn decode_as<T: DeserializeOwned>(
    kind: &str,
    payload: &Value,
    wrap: fn(T) -> MessageContent,
) -> MessageContent {
    match serde_json::from_value::<T>(payload.clone()) {
        Ok(decoded) => wrap(decoded),
        Err(e) => {
            debug!(kind, error = %e, "content payload did not decode, scanning fields");
            other(kind, payload)
        }
    }
}

fn other(kind: &str, payload: &Value) -> MessageContent {
    MessageContent::Other {
        name: kind.to_string(),
        payload: payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body_of(message: Value) -> String {
        classify(&message).map(|c| c.content.body()).unwrap_or_default()
    }

    #[test]
    fn body_rules_per_kind() {
        assert_eq!(body_of(json!({"conversation": "hello"})), "hello");
        assert_eq!(body_of(json!({"extendedTextMessage": {"text": "ping"}})), "ping");
        assert_eq!(body_of(json!({"imageMessage": {"caption": "look"}})), "look");
        assert_eq!(body_of(json!({"videoMessage": {}})), "");
        assert_eq!(body_of(json!({"audioMessage": {"ptt": true}})), "");
        assert_eq!(body_of(json!({"stickerMessage": {"url": "x"}})), "");
        assert_eq!(
            body_of(json!({"documentMessage": {"fileName": "cv.pdf"}})),
            "cv.pdf"
        );
        assert_eq!(
            body_of(json!({"documentMessage": {"fileName": "cv.pdf", "caption": "my cv"}})),
            "my cv"
        );
        assert_eq!(
            body_of(json!({"buttonsResponseMessage": {"selectedButtonId": ".song 1"}})),
            ".song 1"
        );
        assert_eq!(
            body_of(json!({"templateButtonReplyMessage": {"selectedId": ".menu"}})),
            ".menu"
        );
        assert_eq!(
            body_of(json!({"listResponseMessage": {
                "title": "t",
                "singleSelectReply": {"selectedRowId": "row-2"}
            }})),
            "row-2"
        );
        assert_eq!(body_of(json!({"listResponseMessage": {"title": "t"}})), "t");
        assert_eq!(
            body_of(json!({"interactiveResponseMessage": {
                "nativeFlowResponseMessage": {"paramsJson": "{\"id\":\".alive\"}"}
            }})),
            "{\"id\":\".alive\"}"
        );
    }

    #[test]
    fn unknown_kind_scans_common_fields() {
        let c = classify(&json!({"pollCreationMessage": {"body": "vote"}})).unwrap();
        assert_eq!(c.content.message_type(), MessageType::Other("pollCreationMessage".into()));
        assert_eq!(c.content.body(), "vote");
        assert_eq!(body_of(json!({"reactionMessage": {"emoji": "x"}})), "");
    }

    #[test]
    fn ignored_keys_are_skipped() {
        let c = classify(&json!({
            "messageContextInfo": {"deviceListMetadata": {}},
            "senderKeyDistributionMessage": {"groupId": "g"},
        }));
        assert!(c.is_none());
    }

    #[test]
    fn malformed_payload_degrades_to_other() {
        let c = classify(&json!({"extendedTextMessage": {"text": 12}})).unwrap();
        assert!(matches!(c.content, MessageContent::Other { .. }));
        assert_eq!(c.content.body(), "");
        let c = classify(&json!({"conversation": {"nested": true}})).unwrap();
        assert_eq!(c.content.body(), "");
    }

    #[test]
    fn non_object_message_has_no_content() {
        assert!(classify(&json!("text")).is_none());
        assert!(classify(&json!({})).is_none());
        assert!(classify(&json!({"conversation": null})).is_none());
    }

    #[test]
    fn view_once_unwraps_one_level() {
        let c = classify(&json!({
            "viewOnceMessageV2": {"message": {"imageMessage": {"caption": "secret"}}}
        }))
        .unwrap();
        assert!(c.view_once);
        assert_eq!(c.content.message_type(), MessageType::Image);
        assert_eq!(c.content.body(), "secret");
    }

    #[test]
    fn nested_view_once_is_not_unwrapped_again() {
        let c = classify(&json!({
            "viewOnceMessage": {"message": {
                "viewOnceMessage": {"message": {"conversation": "deep"}}
            }}
        }))
        .unwrap();
        assert!(c.view_once);
        assert_eq!(c.content, MessageContent::ViewOnce);
        assert_eq!(c.content.body(), "");
    }

    #[test]
    fn context_info_variants() {
        let payload = json!({
            "text": "hi",
            "contextInfo": {
                "stanzaId": "Q1",
                "participant": "9475@s.whatsapp.net",
                "mentionedJid": "9476@s.whatsapp.net",
                "quotedMessage": {"conversation": "orig"}
            }
        });
        let ctx = ContextInfo::from_payload(&payload);
        assert_eq!(ctx.stanza_id.as_deref(), Some("Q1"));
        assert_eq!(ctx.mentioned, vec!["9476@s.whatsapp.net".to_string()]);
        assert!(ctx.quoted_message.is_some());

        let empty = ContextInfo::from_payload(&json!({"contextInfo": {"quotedMessage": {}}}));
        assert_eq!(empty, ContextInfo::default());
    }
}
