//! Test support for the nova crates: an in-memory [`Transport`] that records
//! every outbound call so dispatcher tests can assert on what the bot did.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use nova_commands::{
    BlockAction, GroupMetadata, GroupSetting, ParticipantAction, Transport, TransportError,
};
use nova_message::{MessageKey, OutgoingContent, Presence};

/// Identity the recording transport reports for the bot.
pub const BOT: &str = "94700000000@s.whatsapp.net";

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        to: String,
        content: OutgoingContent,
        /// Id of the quoted message, if any.
        quoted: Option<String>,
    },
    MarkRead(String),
    Presence(String, Presence),
    Block(String, BlockAction),
    Participants(String, Vec<String>, ParticipantAction),
    Setting(String, GroupSetting),
    Leave(String),
}

/// Answers from canned group metadata and records everything else.
/// Unknown groups fail with a 404 rejection. Sent keys are `SENT<n>`.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    groups: Mutex<HashMap<String, GroupMetadata>>,
    metadata_lookups: Mutex<usize>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(self, meta: GroupMetadata) -> Self {
        locked(&self.groups).insert(meta.id.clone(), meta);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        locked(&self.calls).clone()
    }

    /// How many times group metadata was requested.
    pub fn metadata_lookups(&self) -> usize {
        *locked(&self.metadata_lookups)
    }

    /// Bodies of every text message sent, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send {
                    content: OutgoingContent::Text { text, .. },
                    ..
                } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        locked(&self.calls).push(call);
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn own_identity(&self) -> Result<String, TransportError> {
        Ok(BOT.to_string())
    }

    async fn send(
        &self,
        to: &str,
        content: OutgoingContent,
        quoted: Option<&MessageKey>,
    ) -> Result<MessageKey, TransportError> {
        let n = locked(&self.calls).len();
        self.record(Call::Send {
            to: to.to_string(),
            content,
            quoted: quoted.map(|k| k.id.clone()),
        });
        Ok(MessageKey {
            remote_jid: to.to_string(),
            from_me: true,
            id: format!("SENT{n}"),
            participant: None,
        })
    }

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, TransportError> {
        *locked(&self.metadata_lookups) += 1;
        locked(&self.groups)
            .get(group)
            .cloned()
            .ok_or_else(|| TransportError::Rejected {
                status: 404,
                message: format!("unknown group {group}"),
            })
    }

    async fn mark_read(&self, key: &MessageKey) -> Result<(), TransportError> {
        self.record(Call::MarkRead(key.id.clone()));
        Ok(())
    }

    async fn send_presence(&self, chat: &str, presence: Presence) -> Result<(), TransportError> {
        self.record(Call::Presence(chat.to_string(), presence));
        Ok(())
    }

    async fn update_block_status(
        &self,
        identity: &str,
        action: BlockAction,
    ) -> Result<(), TransportError> {
        self.record(Call::Block(identity.to_string(), action));
        Ok(())
    }

    async fn group_participants_update(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), TransportError> {
        self.record(Call::Participants(
            group.to_string(),
            participants.to_vec(),
            action,
        ));
        Ok(())
    }

    async fn group_setting_update(
        &self,
        group: &str,
        setting: GroupSetting,
    ) -> Result<(), TransportError> {
        self.record(Call::Setting(group.to_string(), setting));
        Ok(())
    }

    async fn group_leave(&self, group: &str) -> Result<(), TransportError> {
        self.record(Call::Leave(group.to_string()));
        Ok(())
    }
}
