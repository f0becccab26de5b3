//! Message normalization: raw envelope → [`NormalizedMessage`].
//!
//! Normalization is pure and total. Whatever shape the payload has, the result
//! is a message value; missing pieces become empty strings, empty mention
//! lists and `None` quotes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use nova_core::jid;

use crate::content::{classify, Classified, ContextInfo, MessageContent, MessageType};
use crate::raw::{MessageKey, RawEnvelope};

/// What the normalizer needs to know about the bot itself.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// The bot's own JID (device suffix allowed).
    pub bot_identity: &'a str,
    /// Bare phone numbers of configured owners (digits only).
    pub owner_numbers: &'a [String],
}

impl<'a> NormalizeContext<'a> {
    pub fn new(bot_identity: &'a str, owner_numbers: &'a [String]) -> Self {
        Self {
            bot_identity,
            owner_numbers,
        }
    }

    fn bot_number(&self) -> &'a str {
        jid::user_part(self.bot_identity)
    }

    fn is_owner_number(&self, number: &str) -> bool {
        !number.is_empty()
            && (number == self.bot_number() || self.owner_numbers.iter().any(|n| n == number))
    }
}

/// Canonical view of one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMessage {
    pub message_type: MessageType,
    /// Extracted plain text; empty when the content carries none.
    pub body: String,
    pub id: String,
    /// Conversation target the message belongs to.
    pub chat: String,
    /// Canonical author identity.
    pub sender: String,
    pub sender_number: String,
    pub push_name: Option<String>,
    pub is_group: bool,
    pub is_from_self: bool,
    pub is_owner: bool,
    /// The content was reached by removing a view-once wrapper.
    pub view_once: bool,
    /// Deduplicated, well-formed, never containing the bot itself.
    pub mentioned_users: Vec<String>,
    /// The replied-to message, normalized one level deep.
    pub quoted: Option<Box<NormalizedMessage>>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Key of this message, for quoting and reacting.
    pub key: MessageKey,
    pub content: Option<MessageContent>,
}

impl NormalizedMessage {
    /// The sender of the quoted message, when replying.
    pub fn quoted_sender(&self) -> Option<&str> {
        self.quoted
            .as_deref()
            .map(|q| q.sender.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Normalize a raw envelope. Never fails and never panics on odd shapes.
pub fn normalize(raw: &RawEnvelope, ctx: &NormalizeContext<'_>) -> NormalizedMessage {
    let chat = raw.key.remote_jid.clone();
    let is_group = jid::is_group(&chat);
    let is_from_self = raw.key.from_me;

    let sender_raw = if is_from_self {
        ctx.bot_identity.to_string()
    } else {
        raw.key
            .participant
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| chat.clone())
    };
    let sender = jid::normalize(&sender_raw);
    let sender_number = jid::user_part(&sender).to_string();

    let classified = raw.message.as_ref().and_then(classify);
    let (message_type, body, view_once, content, info) = match classified {
        Some(Classified {
            content,
            payload,
            view_once,
        }) => (
            content.message_type(),
            content.body(),
            view_once,
            Some(content),
            ContextInfo::from_payload(&payload),
        ),
        None => (
            MessageType::Empty,
            String::new(),
            false,
            None,
            ContextInfo::default(),
        ),
    };

    let mentioned_users = collect_mentions(&info, ctx);
    let quoted = info
        .quoted_message
        .as_ref()
        .map(|q| Box::new(normalize_quoted(q, &info, &chat, is_group, ctx)));

    NormalizedMessage {
        message_type,
        body,
        id: raw.key.id.clone(),
        is_owner: ctx.is_owner_number(&sender_number),
        chat,
        sender,
        sender_number,
        push_name: raw.push_name.clone(),
        is_group,
        is_from_self,
        view_once,
        mentioned_users,
        quoted,
        timestamp: raw
            .message_timestamp
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        key: raw.key.clone(),
        content,
    }
}

/// Build the quoted view. It is never expanded further: its own quote is dropped.
fn normalize_quoted(
    quoted: &Value,
    parent_info: &ContextInfo,
    chat: &str,
    is_group: bool,
    ctx: &NormalizeContext<'_>,
) -> NormalizedMessage {
    let sender_raw = parent_info
        .participant
        .clone()
        .or_else(|| (!is_group).then(|| chat.to_string()))
        .unwrap_or_default();
    let sender = jid::normalize(&sender_raw);
    let sender_number = jid::user_part(&sender).to_string();
    let is_from_self = jid::same_user(&sender, ctx.bot_identity);

    let classified = classify(quoted);
    let (message_type, body, view_once, content, info) = match classified {
        Some(Classified {
            content,
            payload,
            view_once,
        }) => (
            content.message_type(),
            content.body(),
            view_once,
            Some(content),
            ContextInfo::from_payload(&payload),
        ),
        None => (
            MessageType::Empty,
            String::new(),
            false,
            None,
            ContextInfo::default(),
        ),
    };

    let id = parent_info.stanza_id.clone().unwrap_or_default();
    NormalizedMessage {
        message_type,
        body,
        key: MessageKey {
            remote_jid: chat.to_string(),
            from_me: is_from_self,
            id: id.clone(),
            participant: (is_group && !sender.is_empty()).then(|| sender.clone()),
        },
        id,
        chat: chat.to_string(),
        is_owner: ctx.is_owner_number(&sender_number),
        sender,
        sender_number,
        push_name: None,
        is_group,
        is_from_self,
        view_once,
        mentioned_users: collect_mentions(&info, ctx),
        quoted: None,
        timestamp: None,
        content,
    }
}

/// Explicit mentions plus the quoted author, deduplicated in first-seen order.
fn collect_mentions(info: &ContextInfo, ctx: &NormalizeContext<'_>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for candidate in info.mentioned.iter().chain(info.participant.iter()) {
        if !jid::is_well_formed(candidate) || jid::same_user(candidate, ctx.bot_identity) {
            continue;
        }
        let canonical = jid::normalize(candidate);
        if !out.contains(&canonical) {
            out.push(canonical);
        }
    }
    out
}
