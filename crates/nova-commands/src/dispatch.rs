//! The command dispatcher: one cycle per inbound envelope.
//!
//! Order within a cycle is fixed: passive handlers first, in registration
//! order, then at most one explicit command. Every handler call goes through
//! [`supervise`], so an `Err` or a panic is logged and contained.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use nova_core::config::{BotMode, NovaConfig, DEFAULT_PREFIX};
use nova_core::jid;
use nova_message::{normalize, NormalizeContext, NormalizedMessage, RawEnvelope};

use crate::context::InvocationContext;
use crate::registry::{CommandDescriptor, CommandRegistry};
use crate::role::{self, Roles};
use crate::transport::{GroupMetadata, Transport};

/// Dispatcher configuration, usually taken from `[bot]`.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub prefix: String,
    /// Bare phone numbers treated as owners.
    pub owner_numbers: Vec<String>,
    pub mode: BotMode,
    pub auto_read_status: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            owner_numbers: Vec::new(),
            mode: BotMode::Public,
            auto_read_status: true,
        }
    }
}

impl From<&NovaConfig> for DispatchSettings {
    fn from(config: &NovaConfig) -> Self {
        Self {
            prefix: config.bot.prefix.clone(),
            owner_numbers: config.owner_numbers(),
            mode: config.bot.mode,
            auto_read_status: config.bot.auto_read_status,
        }
    }
}

/// Why a handler call did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFailure {
    #[error("handler returned an error: {0}")]
    Error(String),
    #[error("handler panicked: {0}")]
    Panic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Status posts are never dispatched.
    StatusBroadcast,
}

/// The explicit command that ran in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub pattern: String,
    pub keyword: String,
    pub failure: Option<HandlerFailure>,
}

/// What happened during one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub skipped: Option<SkipReason>,
    /// Patterns of passive handlers that ran, in order.
    pub passive_run: Vec<String>,
    /// Passive handlers that failed, with their failure.
    pub passive_failed: Vec<(String, HandlerFailure)>,
    /// A command keyword matched but the bot mode refused it.
    pub gated: Option<String>,
    pub command: Option<CommandOutcome>,
}

impl DispatchReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

/// Split a body into `(keyword, args)` when it starts with `prefix`.
///
/// The keyword is lower-cased; args are trimmed. An empty prefix never matches.
pub fn parse_invocation<'a>(body: &'a str, prefix: &str) -> Option<(String, &'a str)> {
    if prefix.is_empty() {
        return None;
    }
    let rest = body.strip_prefix(prefix)?.trim_start();
    let (keyword, args) = match rest.split_once(char::is_whitespace) {
        Some((k, a)) => (k, a.trim()),
        None => (rest, ""),
    };
    if keyword.is_empty() {
        return None;
    }
    Some((keyword.to_lowercase(), args))
}

/// Run a handler future, converting both `Err` and panics into a logged failure.
pub async fn supervise<F>(label: &str, fut: F) -> Result<(), HandlerFailure>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let started = Instant::now();
    let outcome = AssertUnwindSafe(fut).catch_unwind().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(())) => {
            debug!(handler = label, duration_ms = elapsed_ms, "handler completed");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(handler = label, duration_ms = elapsed_ms, error = %e, "handler failed");
            Err(HandlerFailure::Error(format!("{e:#}")))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(handler = label, duration_ms = elapsed_ms, panic = %message, "handler panicked");
            Err(HandlerFailure::Panic(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Matches inbound envelopes against the registry and runs handlers.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    transport: Arc<dyn Transport>,
    settings: DispatchSettings,
    bot_identity: String,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        transport: Arc<dyn Transport>,
        settings: DispatchSettings,
        bot_identity: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            transport,
            settings,
            bot_identity: jid::normalize(&bot_identity.into()),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn bot_identity(&self) -> &str {
        &self.bot_identity
    }

    pub fn normalize(&self, raw: &RawEnvelope) -> NormalizedMessage {
        let ctx = NormalizeContext::new(&self.bot_identity, &self.settings.owner_numbers);
        normalize(raw, &ctx)
    }

    /// One dispatch cycle. Never fails: every problem ends up in the report and the log.
    pub async fn dispatch(&self, raw: RawEnvelope) -> DispatchReport {
        if raw.key.remote_jid == jid::STATUS_BROADCAST {
            if self.settings.auto_read_status {
                if let Err(e) = self.transport.mark_read(&raw.key).await {
                    warn!(error = %e, "failed to mark status as read");
                }
            }
            return DispatchReport::skipped(SkipReason::StatusBroadcast);
        }

        let msg = Arc::new(self.normalize(&raw));
        let raw = Arc::new(raw);
        let mut report = DispatchReport::default();

        let mut matched: Option<(Arc<CommandDescriptor>, String, String)> = None;
        if let Some((keyword, args)) = parse_invocation(&msg.body, &self.settings.prefix) {
            match self.registry.find_by_keyword(&keyword) {
                Some(d) if self.settings.mode.permits(msg.is_owner, msg.is_group) => {
                    matched = Some((Arc::clone(d), keyword, args.to_string()));
                }
                Some(d) => {
                    debug!(
                        command = %d.pattern,
                        mode = self.settings.mode.as_str(),
                        sender = %msg.sender,
                        "command refused by bot mode"
                    );
                    report.gated = Some(d.pattern.clone());
                }
                None => debug!(keyword = %keyword, chat = %msg.chat, "no command for keyword"),
            }
        }

        if !self.registry.has_passive_handlers() && matched.is_none() {
            return report;
        }
        let passives = self.registry.all_passive_handlers();

        let (roles, group) =
            role::resolve(self.transport.as_ref(), &msg, &self.bot_identity).await;

        for descriptor in &passives {
            let ctx = self.context(&descriptor.pattern, "", &msg.body, roles, &group, &msg, &raw);
            let call = descriptor.handler.handle(self.transport.as_ref(), &raw, &msg, &ctx);
            report.passive_run.push(descriptor.pattern.clone());
            if let Err(failure) = supervise(&descriptor.pattern, call).await {
                report.passive_failed.push((descriptor.pattern.clone(), failure));
            }
        }

        if let Some((descriptor, keyword, args)) = matched {
            info!(
                command = %descriptor.pattern,
                chat = %msg.chat,
                sender = %msg.sender,
                "running command"
            );
            let ctx = self.context(&descriptor.pattern, &keyword, &args, roles, &group, &msg, &raw);

            if let Some(emoji) = &descriptor.react {
                if let Err(e) = ctx.react(emoji.as_str()).await {
                    warn!(command = %descriptor.pattern, error = %e, "reaction failed");
                }
            }

            let call = descriptor.handler.handle(self.transport.as_ref(), &raw, &msg, &ctx);
            let failure = supervise(&descriptor.pattern, call).await.err();
            report.command = Some(CommandOutcome {
                pattern: descriptor.pattern.clone(),
                keyword,
                failure,
            });
        }

        report
    }

    #[allow(clippy::too_many_arguments)]
    fn context(
        &self,
        command: &str,
        keyword: &str,
        args: &str,
        roles: Roles,
        group: &Option<Arc<GroupMetadata>>,
        msg: &Arc<NormalizedMessage>,
        raw: &Arc<RawEnvelope>,
    ) -> InvocationContext {
        InvocationContext {
            target: msg.chat.clone(),
            command: command.to_string(),
            keyword: keyword.to_string(),
            args: args.to_string(),
            prefix: self.settings.prefix.clone(),
            roles,
            mode: self.settings.mode,
            bot_identity: self.bot_identity.clone(),
            message: Arc::clone(msg),
            raw: Arc::clone(raw),
            group: group.clone(),
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_keyword_and_args() {
        assert_eq!(
            parse_invocation(".Song  shape of you ", "."),
            Some(("song".to_string(), "shape of you"))
        );
        assert_eq!(parse_invocation(".alive", "."), Some(("alive".to_string(), "")));
        assert_eq!(parse_invocation(". menu", "."), Some(("menu".to_string(), "")));
        assert_eq!(parse_invocation("!!ping x", "!!"), Some(("ping".to_string(), "x")));
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_invocation("hello", "."), None);
        assert_eq!(parse_invocation(".", "."), None);
        assert_eq!(parse_invocation(".   ", "."), None);
        assert_eq!(parse_invocation(".alive", ""), None);
        assert_eq!(parse_invocation("", "."), None);
    }

    #[tokio::test]
    async fn supervise_contains_errors_and_panics() {
        assert_eq!(supervise("ok", async { Ok(()) }).await, Ok(()));

        let err = supervise("err", async { Err(anyhow::anyhow!("boom")) }).await;
        assert_eq!(err, Err(HandlerFailure::Error("boom".into())));

        let panicked = supervise("panic", async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        })
        .await;
        assert_eq!(panicked, Err(HandlerFailure::Panic("kaboom".into())));
    }
}
