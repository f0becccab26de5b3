//! Auto-responses: passive voice/sticker/text replies to exact trigger
//! phrases, plus owner commands to manage and back them up.

pub mod store;

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use nova_commands::{
    CommandHandler, CommandRegistry, CommandSpec, InvocationContext, RegistryError, Transport,
};
use nova_core::config::AutoResponseConfig;
use nova_message::{NormalizedMessage, OutgoingContent, Presence, RawEnvelope};

use crate::loader::Plugin;
pub use store::{AddOutcome, AutoResponseStore, ResponseKind};

const PLUGIN: &str = "autoresponse";
const VOICE_MIMETYPE: &str = "audio/mpeg";
const LIST_PREVIEW_CHARS: usize = 50;

pub struct AutoResponsePlugin {
    store: Arc<AutoResponseStore>,
    config: AutoResponseConfig,
}

impl AutoResponsePlugin {
    pub fn new(config: &AutoResponseConfig) -> Self {
        Self {
            store: Arc::new(AutoResponseStore::new(&config.data_dir)),
            config: config.clone(),
        }
    }

    pub fn store(&self) -> &Arc<AutoResponseStore> {
        &self.store
    }

    fn responder(&self, kind: ResponseKind, enabled: bool) -> Arc<AutoResponder> {
        Arc::new(AutoResponder {
            kind,
            enabled,
            skip_owner: self.config.skip_owner,
            store: Arc::clone(&self.store),
        })
    }
}

#[async_trait]
impl Plugin for AutoResponsePlugin {
    fn name(&self) -> &str {
        PLUGIN
    }

    async fn init(&self) -> anyhow::Result<()> {
        self.store.ensure().await?;
        Ok(())
    }

    fn register(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        let passive = |pattern: &str, description: &str| {
            CommandSpec::passive(pattern)
                .category("auto")
                .description(description)
                .unlisted()
                .source(PLUGIN)
        };
        registry.register(
            passive("autovoice", "Auto voice responses")
                .handler(self.responder(ResponseKind::Voice, self.config.auto_voice)),
        )?;
        registry.register(
            passive("autosticker", "Auto sticker responses")
                .handler(self.responder(ResponseKind::Sticker, self.config.auto_sticker)),
        )?;
        registry.register(
            passive("autoreply", "Auto text responses")
                .handler(self.responder(ResponseKind::Reply, self.config.auto_reply)),
        )?;

        registry.register(
            CommandSpec::new("autoresponse")
                .aliases(["autores", "ar"])
                .react("🤖")
                .category("owner")
                .description("Manage auto-responses")
                .usage("autoresponse <add|remove|list> <type> <trigger> [response]")
                .source(PLUGIN)
                .handler(Arc::new(Manage {
                    store: Arc::clone(&self.store),
                })),
        )?;
        registry.register(
            CommandSpec::new("autobackup")
                .alias("aresbackup")
                .category("owner")
                .description("Back up or restore auto-responses")
                .usage("autobackup <save|load>")
                .source(PLUGIN)
                .handler(Arc::new(Backup {
                    store: Arc::clone(&self.store),
                })),
        )?;
        Ok(())
    }
}

/// Passive handler for one response kind.
struct AutoResponder {
    kind: ResponseKind,
    enabled: bool,
    skip_owner: bool,
    store: Arc<AutoResponseStore>,
}

#[async_trait]
impl CommandHandler for AutoResponder {
    async fn handle(
        &self,
        transport: &dyn Transport,
        _raw: &RawEnvelope,
        msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        // the bot's own replies come back as events; answering them could loop
        if !self.enabled || msg.is_from_self || msg.body.trim().is_empty() {
            return Ok(());
        }
        if self.skip_owner && ctx.is_owner() {
            return Ok(());
        }
        let Some(response) = self.store.lookup(self.kind, &msg.body).await else {
            return Ok(());
        };

        match self.kind {
            ResponseKind::Voice | ResponseKind::Sticker if !response.starts_with("http") => {
                warn!(kind = self.kind.as_str(), "stored response is not a URL, skipping");
                return Ok(());
            }
            ResponseKind::Voice => {
                transport.send_presence(&ctx.target, Presence::Recording).await?;
                ctx.send_rich(OutgoingContent::Audio {
                    url: response,
                    mimetype: VOICE_MIMETYPE.to_string(),
                    ptt: true,
                })
                .await?;
            }
            ResponseKind::Sticker => {
                ctx.send_rich(OutgoingContent::Sticker { url: response }).await?;
            }
            ResponseKind::Reply => {
                ctx.reply(response).await?;
            }
        }
        info!(kind = self.kind.as_str(), chat = %ctx.target, "auto-response sent");
        Ok(())
    }
}

/// Split off the first whitespace-delimited token.
fn next_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim_start()),
        None => (s, ""),
    }
}

/// `trigger | response` when a `|` is present, otherwise the last word is the response.
pub fn split_trigger_response(rest: &str) -> Option<(String, String)> {
    let (trigger, response) = match rest.split_once('|') {
        Some((t, r)) => (t.trim().to_string(), r.trim().to_string()),
        None => {
            let mut words: Vec<&str> = rest.split_whitespace().collect();
            let response = words.pop()?;
            (words.join(" "), response.to_string())
        }
    };
    (!trigger.is_empty() && !response.is_empty()).then_some((trigger, response))
}

fn preview(response: &str) -> String {
    if response.chars().count() > LIST_PREVIEW_CHARS {
        let cut: String = response.chars().take(LIST_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        response.to_string()
    }
}

struct Manage {
    store: Arc<AutoResponseStore>,
}

impl Manage {
    fn usage(prefix: &str) -> String {
        format!(
            "*Auto-Response Management*\n\n\
             {prefix}autoresponse add <type> <trigger> <response>\n\
             {prefix}autoresponse add <type> <trigger words> | <response>\n\
             {prefix}autoresponse remove <type> <trigger>\n\
             {prefix}autoresponse list [type]\n\n\
             Types: voice, sticker, reply\n\
             Example: {prefix}autoresponse add reply hi | Hello there!"
        )
    }

    async fn list(&self, kind_arg: &str) -> String {
        if kind_arg.is_empty() || kind_arg.eq_ignore_ascii_case("all") {
            let mut text = String::from("*All Auto-Responses*\n");
            for kind in ResponseKind::ALL {
                let count = self.store.load(kind).await.len();
                let stem = kind.stem().to_uppercase();
                let _ = write!(text, "\n*{stem}*: {count} responses");
            }
            return text;
        }
        let Some(kind) = ResponseKind::parse(kind_arg) else {
            return invalid_type();
        };
        let map = self.store.load(kind).await;
        if map.is_empty() {
            return format!("No auto-{} responses configured.", kind.as_str());
        }
        let mut text = format!("*Auto-{} Responses*\n", kind.as_str().to_uppercase());
        for (i, (trigger, response)) in map.iter().enumerate() {
            let _ = write!(
                text,
                "\n{}. \"{trigger}\"\n   → {}",
                i + 1,
                preview(response)
            );
        }
        text
    }
}

fn invalid_type() -> String {
    "Invalid type. Use: voice, sticker or reply".to_string()
}

#[async_trait]
impl CommandHandler for Manage {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        if !ctx.is_owner() {
            ctx.reply("Only the owner can manage auto-responses.").await?;
            return Ok(());
        }

        let (action, rest) = next_token(&ctx.args);
        let (kind_arg, rest) = next_token(rest);
        let text = match action.to_lowercase().as_str() {
            "list" => self.list(kind_arg).await,
            "add" => match (ResponseKind::parse(kind_arg), split_trigger_response(rest)) {
                (None, _) if !kind_arg.is_empty() => invalid_type(),
                (Some(kind), Some((trigger, response))) => {
                    match self.store.add(kind, &trigger, &response).await? {
                        AddOutcome::Added => format!(
                            "Auto-{} response added.\nTrigger: \"{trigger}\"",
                            kind.as_str()
                        ),
                        AddOutcome::Duplicate => {
                            format!("Trigger \"{trigger}\" already exists. Remove it first.")
                        }
                        AddOutcome::NotAUrl => format!(
                            "A {} response must be a URL starting with http/https.",
                            kind.as_str()
                        ),
                    }
                }
                _ => format!(
                    "Missing parameters. Use: {}autoresponse add <type> <trigger> <response>",
                    ctx.prefix
                ),
            },
            "remove" => match ResponseKind::parse(kind_arg) {
                None if !kind_arg.is_empty() => invalid_type(),
                Some(kind) if !rest.trim().is_empty() => {
                    let trigger = rest.trim();
                    if self.store.remove(kind, trigger).await? {
                        format!(
                            "Auto-{} response removed.\nTrigger: \"{trigger}\"",
                            kind.as_str()
                        )
                    } else {
                        format!(
                            "Trigger \"{trigger}\" not found in auto-{} responses.",
                            kind.as_str()
                        )
                    }
                }
                _ => format!(
                    "Missing parameters. Use: {}autoresponse remove <type> <trigger>",
                    ctx.prefix
                ),
            },
            _ => Self::usage(&ctx.prefix),
        };
        ctx.reply(text).await?;
        Ok(())
    }
}

struct Backup {
    store: Arc<AutoResponseStore>,
}

#[async_trait]
impl CommandHandler for Backup {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        if !ctx.is_owner() {
            ctx.reply("Owner only.").await?;
            return Ok(());
        }

        let text = match ctx.args.trim().to_lowercase().as_str() {
            "save" | "backup" => {
                let path = self.store.backup().await?;
                format!("Auto-response backup saved.\nLocation: {}", path.display())
            }
            "load" | "restore" => match self.store.restore().await {
                Ok(count) => format!("Restored {count} auto-responses from backup."),
                Err(crate::error::StoreError::NoBackup(_)) => "No backup file found.".to_string(),
                Err(e) => return Err(e.into()),
            },
            _ => format!("Usage: {}autobackup save|load", ctx.prefix),
        };
        ctx.reply(text).await?;
        Ok(())
    }
}
