//! Contract for the messaging transport the bot talks through.
//!
//! The transport owns the socket, encryption and session. Handlers and the
//! dispatcher only see this trait, so tests can substitute an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nova_core::jid;
use nova_message::{MessageKey, OutgoingContent, Presence};

/// Errors returned by transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never reached the transport (connection refused, DNS, …).
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The transport answered with a failure status.
    #[error("transport rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport call timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The transport answered but the body could not be understood.
    #[error("unexpected transport response: {0}")]
    Decode(String),
}

/// Admin level of a group participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Admin,
    Superadmin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub admin: Option<AdminRole>,
}

impl Participant {
    pub fn is_admin(&self) -> bool {
        self.admin.is_some()
    }
}

/// Group metadata as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl GroupMetadata {
    pub fn is_admin(&self, identity: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.is_admin() && jid::same_user(&p.id, identity))
    }

    pub fn is_member(&self, identity: &str) -> bool {
        self.participants
            .iter()
            .any(|p| jid::same_user(&p.id, identity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockAction {
    Block,
    Unblock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// Who may send messages in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSetting {
    /// Only admins can send.
    Announcement,
    /// Everyone can send.
    NotAnnouncement,
}

/// The messaging transport as seen by the bot.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The bot account's own identity.
    async fn own_identity(&self) -> Result<String, TransportError>;

    /// Send content to a conversation, optionally quoting a message.
    /// Returns the key of the message that was sent.
    async fn send(
        &self,
        to: &str,
        content: OutgoingContent,
        quoted: Option<&MessageKey>,
    ) -> Result<MessageKey, TransportError>;

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, TransportError>;

    async fn mark_read(&self, key: &MessageKey) -> Result<(), TransportError>;

    async fn send_presence(&self, chat: &str, presence: Presence) -> Result<(), TransportError>;

    async fn update_block_status(
        &self,
        identity: &str,
        action: BlockAction,
    ) -> Result<(), TransportError>;

    async fn group_participants_update(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), TransportError>;

    async fn group_setting_update(
        &self,
        group: &str,
        setting: GroupSetting,
    ) -> Result<(), TransportError>;

    async fn group_leave(&self, group: &str) -> Result<(), TransportError>;
}
