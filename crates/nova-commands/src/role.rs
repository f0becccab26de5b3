//! Role flags resolved once per inbound event.

use std::sync::Arc;

use tracing::warn;

use nova_message::NormalizedMessage;

use crate::transport::{GroupMetadata, Transport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roles {
    pub is_owner: bool,
    /// The sender administers the current group.
    pub is_group_admin: bool,
    /// The bot administers the current group.
    pub is_bot_group_admin: bool,
}

/// Resolve role flags. In groups this costs one metadata lookup; a failed
/// lookup leaves both admin flags false.
pub async fn resolve(
    transport: &dyn Transport,
    msg: &NormalizedMessage,
    bot_identity: &str,
) -> (Roles, Option<Arc<GroupMetadata>>) {
    let mut roles = Roles {
        is_owner: msg.is_owner,
        ..Roles::default()
    };
    if !msg.is_group {
        return (roles, None);
    }

    match transport.group_metadata(&msg.chat).await {
        Ok(meta) => {
            roles.is_group_admin = meta.is_admin(&msg.sender);
            roles.is_bot_group_admin = meta.is_admin(bot_identity);
            (roles, Some(Arc::new(meta)))
        }
        Err(e) => {
            warn!(chat = %msg.chat, error = %e, "group metadata lookup failed; admin flags off");
            (roles, None)
        }
    }
}
