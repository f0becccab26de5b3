//! Owner and group administration commands.
//!
//! Every command is a row in [`COMMANDS`]; one handler checks the row's
//! [`Requirement`] and then performs the action through the transport.

use std::sync::Arc;

use async_trait::async_trait;

use nova_commands::{
    BlockAction, CommandHandler, CommandRegistry, CommandSpec, GroupMetadata, GroupSetting,
    InvocationContext, ParticipantAction, RegistryError, Transport,
};
use nova_core::jid;
use nova_message::{NormalizedMessage, OutgoingContent, RawEnvelope};

use crate::loader::Plugin;

const PLUGIN: &str = "admin";

/// Who may run a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Owner, anywhere.
    Owner,
    /// Owner, inside a group.
    OwnerInGroup,
    /// Group chat and the sender is a group admin.
    SenderAdmin,
    /// Group chat, the sender is an admin and so is the bot.
    SenderAndBotAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Block,
    Unblock,
    Leave,
    Kick,
    Add,
    Promote,
    Demote,
    Mute,
    Unmute,
    TagAll,
}

struct Row {
    pattern: &'static str,
    aliases: &'static [&'static str],
    category: &'static str,
    description: &'static str,
    requirement: Requirement,
    action: Action,
}

const COMMANDS: &[Row] = &[
    Row {
        pattern: "block",
        aliases: &["ban"],
        category: "owner",
        description: "Block the quoted user",
        requirement: Requirement::Owner,
        action: Action::Block,
    },
    Row {
        pattern: "unblock",
        aliases: &["unban"],
        category: "owner",
        description: "Unblock the quoted user",
        requirement: Requirement::Owner,
        action: Action::Unblock,
    },
    Row {
        pattern: "left",
        aliases: &["leave", "exit"],
        category: "owner",
        description: "Leave the current group",
        requirement: Requirement::OwnerInGroup,
        action: Action::Leave,
    },
    Row {
        pattern: "kick",
        aliases: &["remove"],
        category: "group",
        description: "Remove the quoted or mentioned member",
        requirement: Requirement::SenderAndBotAdmin,
        action: Action::Kick,
    },
    Row {
        pattern: "add",
        aliases: &["invite"],
        category: "group",
        description: "Add the quoted user or a phone number",
        requirement: Requirement::SenderAndBotAdmin,
        action: Action::Add,
    },
    Row {
        pattern: "promote",
        aliases: &["admin", "makeadmin"],
        category: "group",
        description: "Make a member admin",
        requirement: Requirement::SenderAndBotAdmin,
        action: Action::Promote,
    },
    Row {
        pattern: "demote",
        aliases: &["member"],
        category: "group",
        description: "Remove admin rights from a member",
        requirement: Requirement::SenderAndBotAdmin,
        action: Action::Demote,
    },
    Row {
        pattern: "mute",
        aliases: &["silence", "lock"],
        category: "group",
        description: "Only admins can send messages",
        requirement: Requirement::SenderAndBotAdmin,
        action: Action::Mute,
    },
    Row {
        pattern: "unmute",
        aliases: &["unlock"],
        category: "group",
        description: "Everyone can send messages",
        requirement: Requirement::SenderAndBotAdmin,
        action: Action::Unmute,
    },
    Row {
        pattern: "tagall",
        aliases: &["mention", "everyone"],
        category: "group",
        description: "Mention every member",
        requirement: Requirement::SenderAdmin,
        action: Action::TagAll,
    },
];

#[derive(Default)]
pub struct AdminPlugin;

impl AdminPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for AdminPlugin {
    fn name(&self) -> &str {
        PLUGIN
    }

    fn register(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        for row in COMMANDS {
            registry.register(
                CommandSpec::new(row.pattern)
                    .aliases(row.aliases.iter().copied())
                    .category(row.category)
                    .description(row.description)
                    .source(PLUGIN)
                    .handler(Arc::new(AdminCommand {
                        requirement: row.requirement,
                        action: row.action,
                    })),
            )?;
        }
        Ok(())
    }
}

/// Why a requirement is not met, as shown to the user.
pub fn check(requirement: Requirement, ctx: &InvocationContext) -> Result<(), &'static str> {
    let in_group = ctx.is_group();
    let roles = ctx.roles;
    match requirement {
        Requirement::Owner if !roles.is_owner => Err("Only the owner can use this command."),
        Requirement::Owner => Ok(()),
        _ if !in_group => Err("This command can only be used in a group."),
        Requirement::OwnerInGroup if !roles.is_owner => Err("Only the owner can use this command."),
        Requirement::OwnerInGroup => Ok(()),
        _ if !roles.is_group_admin => Err("Only group admins can use this command."),
        Requirement::SenderAndBotAdmin if !roles.is_bot_group_admin => {
            Err("I need to be an admin to do that.")
        }
        _ => Ok(()),
    }
}

struct AdminCommand {
    requirement: Requirement,
    action: Action,
}

fn at(identity: &str) -> String {
    format!("@{}", jid::user_part(identity))
}

/// The quoted author, else the first mentioned user.
fn target_of(msg: &NormalizedMessage) -> Option<String> {
    msg.quoted_sender()
        .map(str::to_string)
        .or_else(|| msg.mentioned_users.first().cloned())
}

impl AdminCommand {
    async fn metadata(&self, ctx: &InvocationContext) -> anyhow::Result<Arc<GroupMetadata>> {
        match &ctx.group {
            Some(meta) => Ok(Arc::clone(meta)),
            None => Ok(Arc::new(ctx.transport().group_metadata(&ctx.target).await?)),
        }
    }

    async fn participants(
        &self,
        ctx: &InvocationContext,
        target: &str,
        action: ParticipantAction,
        done: &str,
    ) -> anyhow::Result<()> {
        let targets = vec![target.to_string()];
        match ctx
            .transport()
            .group_participants_update(&ctx.target, &targets, action)
            .await
        {
            Ok(()) => {
                ctx.reply_with_mentions(format!("{done} {}", at(target)), targets)
                    .await?;
                Ok(())
            }
            Err(e) => {
                ctx.reply(format!("Failed: {e}")).await?;
                Err(e.into())
            }
        }
    }

    async fn run(&self, msg: &NormalizedMessage, ctx: &InvocationContext) -> anyhow::Result<()> {
        let transport = ctx.transport();
        match self.action {
            Action::Block | Action::Unblock => {
                let Some(target) = msg.quoted_sender().map(str::to_string) else {
                    ctx.reply("Reply to the user's message.").await?;
                    return Ok(());
                };
                let (action, verb) = if self.action == Action::Block {
                    (BlockAction::Block, "Blocked")
                } else {
                    (BlockAction::Unblock, "Unblocked")
                };
                transport.update_block_status(&target, action).await?;
                ctx.reply_with_mentions(format!("{verb} {}", at(&target)), vec![target])
                    .await?;
            }
            Action::Leave => {
                ctx.reply("Goodbye everyone!").await?;
                transport.group_leave(&ctx.target).await?;
            }
            Action::Kick => {
                let Some(target) = target_of(msg) else {
                    ctx.reply("Reply to or mention the member to remove.").await?;
                    return Ok(());
                };
                if jid::same_user(&target, &ctx.bot_identity) {
                    ctx.reply("I can't remove myself. Use left instead.").await?;
                    return Ok(());
                }
                if self.metadata(ctx).await?.is_admin(&target) {
                    ctx.reply("I can't remove another admin.").await?;
                    return Ok(());
                }
                self.participants(ctx, &target, ParticipantAction::Remove, "Removed")
                    .await?;
            }
            Action::Add => {
                let target = match msg.quoted_sender() {
                    Some(sender) => Some(sender.to_string()),
                    // numbers are often typed with spaces: "+94 77 123 4567"
                    None => jid::from_number(&ctx.args),
                };
                let Some(target) = target else {
                    ctx.reply("Give a phone number or reply to the user's message.")
                        .await?;
                    return Ok(());
                };
                if self.metadata(ctx).await?.is_member(&target) {
                    ctx.reply("This user is already in the group.").await?;
                    return Ok(());
                }
                self.participants(ctx, &target, ParticipantAction::Add, "Added")
                    .await?;
            }
            Action::Promote | Action::Demote => {
                let Some(target) = target_of(msg) else {
                    ctx.reply("Reply to or mention the member.").await?;
                    return Ok(());
                };
                let meta = self.metadata(ctx).await?;
                if !meta.is_member(&target) {
                    ctx.reply("User not found in the group.").await?;
                    return Ok(());
                }
                let promote = self.action == Action::Promote;
                if meta.is_admin(&target) == promote {
                    let state = if promote { "already" } else { "not" };
                    ctx.reply(format!("{} is {state} an admin.", at(&target)))
                        .await?;
                    return Ok(());
                }
                let (action, done) = if promote {
                    (ParticipantAction::Promote, "Promoted")
                } else {
                    (ParticipantAction::Demote, "Demoted")
                };
                self.participants(ctx, &target, action, done).await?;
            }
            Action::Mute | Action::Unmute => {
                let (setting, text) = if self.action == Action::Mute {
                    (
                        GroupSetting::Announcement,
                        "Group muted. Only admins can send messages.",
                    )
                } else {
                    (
                        GroupSetting::NotAnnouncement,
                        "Group unmuted. Everyone can send messages.",
                    )
                };
                transport.group_setting_update(&ctx.target, setting).await?;
                ctx.reply(text).await?;
            }
            Action::TagAll => {
                let meta = self.metadata(ctx).await?;
                let header = if ctx.args.is_empty() {
                    "Attention everyone".to_string()
                } else {
                    ctx.args.clone()
                };
                let mut text = format!("*{header}*\n");
                let mut mentions = Vec::with_capacity(meta.participants.len());
                for p in &meta.participants {
                    text.push_str(&format!("\n{}", at(&p.id)));
                    mentions.push(p.id.clone());
                }
                ctx.send(OutgoingContent::text_with_mentions(text, mentions))
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for AdminCommand {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        if let Err(reason) = check(self.requirement, ctx) {
            ctx.reply(reason).await?;
            return Ok(());
        }
        self.run(msg, ctx).await
    }
}
