//! Per-invocation context handed to every handler.

use std::fmt;
use std::sync::Arc;

use nova_core::config::BotMode;
use nova_message::{MessageKey, NormalizedMessage, OutgoingContent, RawEnvelope};

use crate::registry::CommandRegistry;
use crate::role::Roles;
use crate::transport::{GroupMetadata, Transport, TransportError};

/// Everything a handler needs about the current invocation.
///
/// Cheap to clone: the message, envelope, registry and transport are shared.
#[derive(Clone)]
pub struct InvocationContext {
    /// Conversation the reply goes to.
    pub target: String,
    /// Pattern of the matched descriptor.
    pub command: String,
    /// Keyword as typed, lower-cased. Empty for passive handlers.
    pub keyword: String,
    /// Text after the keyword, trimmed. The full body for passive handlers.
    pub args: String,
    pub prefix: String,
    pub roles: Roles,
    pub mode: BotMode,
    pub bot_identity: String,
    pub message: Arc<NormalizedMessage>,
    pub raw: Arc<RawEnvelope>,
    /// Group metadata fetched while resolving roles, when in a group.
    pub group: Option<Arc<GroupMetadata>>,
    pub(crate) registry: Arc<CommandRegistry>,
    pub(crate) transport: Arc<dyn Transport>,
}

impl InvocationContext {
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// The registry, for handlers that describe other commands.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn is_owner(&self) -> bool {
        self.roles.is_owner
    }

    pub fn is_group(&self) -> bool {
        self.message.is_group
    }

    /// Plain-text reply quoting the triggering message.
    pub async fn reply(&self, text: impl Into<String>) -> Result<MessageKey, TransportError> {
        self.send_rich(OutgoingContent::text(text)).await
    }

    pub async fn reply_with_mentions(
        &self,
        text: impl Into<String>,
        mentions: Vec<String>,
    ) -> Result<MessageKey, TransportError> {
        self.send_rich(OutgoingContent::text_with_mentions(text, mentions))
            .await
    }

    /// Media or structured reply quoting the triggering message.
    pub async fn send_rich(&self, content: OutgoingContent) -> Result<MessageKey, TransportError> {
        self.transport
            .send(&self.target, content, Some(&self.message.key))
            .await
    }

    /// Send to the current conversation without quoting.
    pub async fn send(&self, content: OutgoingContent) -> Result<MessageKey, TransportError> {
        self.transport.send(&self.target, content, None).await
    }

    /// React to the triggering message.
    pub async fn react(&self, emoji: impl Into<String>) -> Result<MessageKey, TransportError> {
        let content = OutgoingContent::reaction(emoji, self.message.key.clone());
        self.transport.send(&self.target, content, None).await
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("target", &self.target)
            .field("command", &self.command)
            .field("keyword", &self.keyword)
            .field("args", &self.args)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}
