//! Content the bot sends back through the transport.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::raw::MessageKey;

/// An outgoing message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingContent {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        mentions: Vec<String>,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Video {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Audio {
        url: String,
        mimetype: String,
        /// Send as a voice note.
        #[serde(default)]
        ptt: bool,
    },
    Sticker {
        url: String,
    },
    Document {
        url: String,
        file_name: String,
        mimetype: String,
    },
    /// Emoji reaction on an existing message. An empty emoji removes it.
    Reaction {
        emoji: String,
        key: MessageKey,
    },
}

impl OutgoingContent {
    pub fn text(text: impl Into<String>) -> Self {
        OutgoingContent::Text {
            text: text.into(),
            mentions: Vec::new(),
        }
    }

    pub fn text_with_mentions(text: impl Into<String>, mentions: Vec<String>) -> Self {
        OutgoingContent::Text {
            text: text.into(),
            mentions,
        }
    }

    pub fn reaction(emoji: impl Into<String>, key: MessageKey) -> Self {
        OutgoingContent::Reaction {
            emoji: emoji.into(),
            key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutgoingContent::Text { .. } => "text",
            OutgoingContent::Image { .. } => "image",
            OutgoingContent::Video { .. } => "video",
            OutgoingContent::Audio { .. } => "audio",
            OutgoingContent::Sticker { .. } => "sticker",
            OutgoingContent::Document { .. } => "document",
            OutgoingContent::Reaction { .. } => "reaction",
        }
    }

    /// Render as a Baileys `sendMessage` content object.
    pub fn to_baileys(&self) -> Value {
        match self {
            OutgoingContent::Text { text, mentions } => {
                let mut obj = Map::new();
                obj.insert("text".into(), json!(text));
                if !mentions.is_empty() {
                    obj.insert("mentions".into(), json!(mentions));
                }
                Value::Object(obj)
            }
            OutgoingContent::Image { url, caption } => media("image", url, caption.as_deref()),
            OutgoingContent::Video { url, caption } => media("video", url, caption.as_deref()),
            OutgoingContent::Audio { url, mimetype, ptt } => json!({
                "audio": {"url": url},
                "mimetype": mimetype,
                "ptt": ptt,
            }),
            OutgoingContent::Sticker { url } => json!({"sticker": {"url": url}}),
            OutgoingContent::Document {
                url,
                file_name,
                mimetype,
            } => json!({
                "document": {"url": url},
                "fileName": file_name,
                "mimetype": mimetype,
            }),
            OutgoingContent::Reaction { emoji, key } => json!({
                "react": {"text": emoji, "key": key},
            }),
        }
    }
}

fn media(field: &str, url: &str, caption: Option<&str>) -> Value {
    let mut obj = Map::new();
    obj.insert(field.to_string(), json!({"url": url}));
    if let Some(caption) = caption {
        obj.insert("caption".into(), json!(caption));
    }
    Value::Object(obj)
}

/// Chat presence shown to the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Composing,
    Recording,
    Available,
    Paused,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Composing => "composing",
            Presence::Recording => "recording",
            Presence::Available => "available",
            Presence::Paused => "paused",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_omits_empty_mentions() {
        assert_eq!(OutgoingContent::text("hi").to_baileys(), json!({"text": "hi"}));
        let with = OutgoingContent::text_with_mentions("@a", vec!["a@s.whatsapp.net".into()]);
        assert_eq!(
            with.to_baileys(),
            json!({"text": "@a", "mentions": ["a@s.whatsapp.net"]})
        );
    }

    #[test]
    fn reaction_carries_key() {
        let key = MessageKey {
            remote_jid: "1@g.us".into(),
            from_me: false,
            id: "ABC".into(),
            participant: Some("9@s.whatsapp.net".into()),
        };
        let v = OutgoingContent::reaction("🎵", key).to_baileys();
        assert_eq!(v["react"]["text"], "🎵");
        assert_eq!(v["react"]["key"]["remoteJid"], "1@g.us");
        assert_eq!(v["react"]["key"]["participant"], "9@s.whatsapp.net");
    }

    #[test]
    fn media_caption_optional() {
        let img = OutgoingContent::Image {
            url: "https://x/y.png".into(),
            caption: None,
        };
        assert_eq!(img.to_baileys(), json!({"image": {"url": "https://x/y.png"}}));
        assert_eq!(img.kind(), "image");
    }

    #[test]
    fn presence_names() {
        assert_eq!(Presence::Composing.as_str(), "composing");
        assert_eq!(
            serde_json::to_value(Presence::Recording).unwrap(),
            json!("recording")
        );
    }
}
