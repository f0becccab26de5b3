//! Command registry: descriptors registered by plugins at load time.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::handler::CommandHandler;

pub const DEFAULT_CATEGORY: &str = "misc";
pub const DEFAULT_SOURCE: &str = "unknown";

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The descriptor breaks a registration invariant.
    #[error("invalid command descriptor `{pattern}`: {reason}")]
    Validation { pattern: String, reason: String },
}

/// How a command is triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerType {
    /// A prefixed keyword such as `.alive`.
    #[default]
    ExplicitText,
    /// Runs on every inbound message and filters on the body itself.
    PassiveBody,
}

/// Builder for a command registration.
pub struct CommandSpec {
    pattern: String,
    aliases: Vec<String>,
    trigger: TriggerType,
    category: Option<String>,
    listed: bool,
    description: Option<String>,
    usage: Option<String>,
    react: Option<String>,
    source: Option<String>,
    handler: Option<Arc<dyn CommandHandler>>,
}

impl CommandSpec {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            aliases: Vec::new(),
            trigger: TriggerType::ExplicitText,
            category: None,
            listed: true,
            description: None,
            usage: None,
            react: None,
            source: None,
            handler: None,
        }
    }

    /// Shorthand for a passive handler.
    pub fn passive(pattern: impl Into<String>) -> Self {
        Self::new(pattern).trigger(TriggerType::PassiveBody)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn trigger(mut self, trigger: TriggerType) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Hide the command from generated menus.
    pub fn unlisted(mut self) -> Self {
        self.listed = false;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Emoji reaction sent on the triggering message before the handler runs.
    pub fn react(mut self, emoji: impl Into<String>) -> Self {
        self.react = Some(emoji.into());
        self
    }

    /// Name of the plugin that registers the command.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    fn build(self) -> Result<CommandDescriptor, RegistryError> {
        let pattern = normalize_keyword(&self.pattern);
        let invalid = |reason: &str| RegistryError::Validation {
            pattern: self.pattern.clone(),
            reason: reason.to_string(),
        };
        if pattern.is_empty() {
            return Err(invalid("pattern must not be empty"));
        }
        if pattern.chars().any(char::is_whitespace) {
            return Err(invalid("pattern must be a single word"));
        }
        let Some(handler) = self.handler.clone() else {
            return Err(invalid("no handler attached"));
        };

        let mut aliases: Vec<String> = Vec::new();
        for alias in &self.aliases {
            let alias = normalize_keyword(alias);
            if alias.is_empty() || alias.chars().any(char::is_whitespace) {
                return Err(invalid("aliases must be single non-empty words"));
            }
            if alias != pattern && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        Ok(CommandDescriptor {
            pattern,
            aliases,
            trigger: self.trigger,
            category: self
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            listed: self.listed,
            description: self.description,
            usage: self.usage,
            react: self.react.filter(|r| !r.is_empty()),
            source: self.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            handler,
        })
    }
}

/// An immutable registered command.
pub struct CommandDescriptor {
    pub pattern: String,
    pub aliases: Vec<String>,
    pub trigger: TriggerType,
    pub category: String,
    pub listed: bool,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub react: Option<String>,
    pub source: String,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandDescriptor {
    /// Exact match against the pattern or an alias. `keyword` must already be normalized.
    fn answers_to(&self, keyword: &str) -> bool {
        self.pattern == keyword || self.aliases.iter().any(|a| a == keyword)
    }

    pub fn is_passive(&self) -> bool {
        self.trigger == TriggerType::PassiveBody
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("pattern", &self.pattern)
            .field("aliases", &self.aliases)
            .field("trigger", &self.trigger)
            .field("category", &self.category)
            .field("listed", &self.listed)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Opaque registry length marker used to roll back a failed plugin load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// All registered commands, in registration order.
///
/// Built once at startup, then shared read-only (`Arc<CommandRegistry>`).
#[derive(Default)]
pub struct CommandRegistry {
    entries: Vec<Arc<CommandDescriptor>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a command. Duplicate explicit patterns are kept;
    /// lookups return the earliest registration.
    pub fn register(&mut self, spec: CommandSpec) -> Result<Arc<CommandDescriptor>, RegistryError> {
        let descriptor = Arc::new(spec.build()?);

        if !descriptor.is_passive() {
            let clash = self.explicit().find(|d| {
                d.answers_to(&descriptor.pattern)
                    || descriptor.aliases.iter().any(|a| d.answers_to(a))
            });
            if let Some(existing) = clash {
                warn!(
                    command = %descriptor.pattern,
                    source = %descriptor.source,
                    shadowed_by = %existing.pattern,
                    "duplicate command keyword; earlier registration wins"
                );
            }
        }

        debug!(
            command = %descriptor.pattern,
            trigger = ?descriptor.trigger,
            category = %descriptor.category,
            source = %descriptor.source,
            "command registered"
        );
        self.entries.push(Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Case-insensitive, whitespace-trimmed lookup over explicit commands.
    pub fn find_by_keyword(&self, keyword: &str) -> Option<&Arc<CommandDescriptor>> {
        let keyword = normalize_keyword(keyword);
        if keyword.is_empty() {
            return None;
        }
        self.explicit().find(|d| d.answers_to(&keyword))
    }

    /// Every passive handler in registration order.
    pub fn all_passive_handlers(&self) -> Vec<Arc<CommandDescriptor>> {
        self.entries.iter().filter(|d| d.is_passive()).cloned().collect()
    }

    pub fn has_passive_handlers(&self) -> bool {
        self.entries.iter().any(|d| d.is_passive())
    }

    pub fn by_category(&self, category: &str) -> Vec<Arc<CommandDescriptor>> {
        self.entries
            .iter()
            .filter(|d| d.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }

    /// Distinct categories in first-seen order.
    pub fn all_categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for d in &self.entries {
            if !out.contains(&d.category) {
                out.push(d.category.clone());
            }
        }
        out
    }

    /// Listed explicit commands grouped by category, categories in first-seen order.
    pub fn listed_by_category(&self) -> Vec<(String, Vec<Arc<CommandDescriptor>>)> {
        let mut groups: Vec<(String, Vec<Arc<CommandDescriptor>>)> = Vec::new();
        for d in self.explicit().filter(|d| d.listed) {
            match groups.iter_mut().find(|(c, _)| *c == d.category) {
                Some((_, cmds)) => cmds.push(Arc::clone(d)),
                None => groups.push((d.category.clone(), vec![Arc::clone(d)])),
            }
        }
        groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommandDescriptor>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark the current end of the registry.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.entries.len())
    }

    /// Drop everything registered after `checkpoint`. Only meant for undoing a
    /// plugin whose load failed part-way.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> usize {
        let removed = self.entries.len().saturating_sub(checkpoint.0);
        self.entries.truncate(checkpoint.0);
        removed
    }

    fn explicit(&self) -> impl Iterator<Item = &Arc<CommandDescriptor>> {
        self.entries.iter().filter(|d| !d.is_passive())
    }
}

fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}
