//! General commands: liveness, latency, bot and host info, command listings.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use nova_commands::{
    CommandHandler, CommandRegistry, CommandSpec, InvocationContext, RegistryError, Transport,
};
use nova_core::NovaConfig;
use nova_message::{NormalizedMessage, RawEnvelope};

use crate::loader::Plugin;

const PLUGIN: &str = "general";
const CATEGORY: &str = "main";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Human-readable uptime: `"1 day, 2 hours and 5 seconds"`.
///
/// Zero components are left out; a zero duration reads `"0 seconds"`.
pub fn format_runtime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let units = [
        (total / 86_400, "day"),
        (total % 86_400 / 3_600, "hour"),
        (total % 3_600 / 60, "minute"),
        (total % 60, "second"),
    ];

    let mut parts: Vec<String> = units
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n} {unit}{}", if *n == 1 { "" } else { "s" }))
        .collect();

    match parts.len() {
        0 => "0 seconds".to_string(),
        1 => parts.remove(0),
        _ => {
            let last = parts.pop().unwrap_or_default();
            format!("{} and {last}", parts.join(", "))
        }
    }
}

struct Info {
    bot_name: String,
    alive_message: String,
    /// Bare owner numbers, digits only.
    owners: Vec<String>,
    started: Instant,
}

impl Info {
    fn uptime(&self) -> String {
        format_runtime(self.started.elapsed())
    }
}

pub struct GeneralPlugin {
    info: Arc<Info>,
}

impl GeneralPlugin {
    pub fn new(config: &NovaConfig) -> Self {
        Self {
            info: Arc::new(Info {
                bot_name: config.bot.name.clone(),
                alive_message: config.bot.alive_message.clone(),
                owners: config.owner_numbers(),
                started: Instant::now(),
            }),
        }
    }
}

#[async_trait]
impl Plugin for GeneralPlugin {
    fn name(&self) -> &str {
        PLUGIN
    }

    fn register(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError> {
        let spec = |pattern: &str| CommandSpec::new(pattern).category(CATEGORY).source(PLUGIN);

        registry.register(
            spec("alive")
                .aliases(["bot", "online", "check"])
                .react("🤖")
                .description("Check whether the bot is online")
                .handler(Arc::new(Alive(Arc::clone(&self.info)))),
        )?;
        registry.register(
            spec("ping")
                .aliases(["speed", "latency"])
                .react("⚡")
                .description("Measure response latency")
                .handler(Arc::new(Ping(Arc::clone(&self.info)))),
        )?;
        registry.register(
            spec("botinfo")
                .aliases(["info", "about", "owner"])
                .react("📋")
                .description("Get bot information")
                .handler(Arc::new(BotInfo(Arc::clone(&self.info)))),
        )?;
        registry.register(
            spec("system")
                .aliases(["stats", "status", "performance"])
                .react("📊")
                .description("Check system performance")
                .handler(Arc::new(SystemStatus(Arc::clone(&self.info)))),
        )?;
        registry.register(
            spec("menu")
                .aliases(["cmd", "commands"])
                .react("📋")
                .description("Show every command by category")
                .handler(Arc::new(Menu(Arc::clone(&self.info)))),
        )?;
        registry.register(
            spec("help")
                .alias("cmdinfo")
                .react("❓")
                .description("Show details for one command")
                .usage("help <command>")
                .handler(Arc::new(Help)),
        )?;
        registry.register(
            spec("list")
                .aliases(["cmds", "shortmenu"])
                .description("Quick command list")
                .handler(Arc::new(QuickList)),
        )?;
        Ok(())
    }
}

struct Alive(Arc<Info>);

#[async_trait]
impl CommandHandler for Alive {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        let text = format!(
            "{}\n\n*{}* is online\nUptime: {}\nPrefix: {}\nMode: {}\nVersion: {VERSION}",
            self.0.alive_message,
            self.0.bot_name,
            self.0.uptime(),
            ctx.prefix,
            ctx.mode.as_str(),
        );
        ctx.reply(text).await?;
        Ok(())
    }
}

struct Ping(Arc<Info>);

#[async_trait]
impl CommandHandler for Ping {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        let start = Instant::now();
        ctx.reply("Pinging...").await?;
        let latency = start.elapsed().as_millis();
        ctx.reply(format!(
            "*Pong!*\nLatency: {latency} ms\nUptime: {}",
            self.0.uptime()
        ))
        .await?;
        Ok(())
    }
}

struct BotInfo(Arc<Info>);

#[async_trait]
impl CommandHandler for BotInfo {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        let owners = if self.0.owners.is_empty() {
            "not configured".to_string()
        } else {
            self.0.owners.join(", ")
        };
        let mut text = format!("*{} Information*\n\n", self.0.bot_name);
        let _ = writeln!(text, "Name: {}", self.0.bot_name);
        let _ = writeln!(text, "Version: {VERSION}");
        let _ = writeln!(text, "Prefix: {}", ctx.prefix);
        let _ = writeln!(text, "Owner: {owners}");
        let _ = writeln!(text, "Mode: {}", ctx.mode.as_str());
        let _ = writeln!(text, "Total Commands: {}", ctx.registry().len());
        let _ = writeln!(text, "Uptime: {}", self.0.uptime());
        let _ = writeln!(
            text,
            "Platform: {} {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        let _ = write!(text, "\nUse {}menu to see all commands", ctx.prefix);
        ctx.reply(text).await?;
        Ok(())
    }
}

/// Point-in-time process and host figures for `system`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostStats {
    /// Resident memory of this process, bytes.
    pub process_memory: u64,
    pub total_memory: u64,
    pub available_memory: u64,
    pub cpu_brand: String,
    pub cpu_cores: usize,
    pub os: String,
    pub kernel: String,
}

impl HostStats {
    pub fn collect() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        sys.refresh_cpu_list(sysinfo::CpuRefreshKind::nothing());
        let pid = sysinfo::get_current_pid().ok();
        if let Some(pid) = pid {
            sys.refresh_processes_specifics(
                sysinfo::ProcessesToUpdate::Some(&[pid]),
                false,
                sysinfo::ProcessRefreshKind::nothing().with_memory(),
            );
        }
        let process_memory = pid
            .and_then(|p| sys.process(p))
            .map(|p| p.memory())
            .unwrap_or(0);
        let total_memory = sys.total_memory();
        // available_memory() reads 0 on some platforms.
        let available_memory = match sys.available_memory() {
            0 => total_memory.saturating_sub(sys.used_memory()),
            v => v,
        };
        Self {
            process_memory,
            total_memory,
            available_memory,
            cpu_brand: sys
                .cpus()
                .first()
                .map(|c| c.brand().trim().to_string())
                .unwrap_or_default(),
            cpu_cores: sys.cpus().len(),
            os: format!(
                "{} {}",
                sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
                std::env::consts::ARCH
            ),
            kernel: sysinfo::System::kernel_version().unwrap_or_default(),
        }
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

/// Text for `system`. Unknown figures render as `unknown`.
pub fn render_system(stats: &HostStats, uptime: &str, commands: usize, prefix: &str) -> String {
    let or_unknown = |s: &str| {
        if s.is_empty() {
            "unknown".to_string()
        } else {
            s.to_string()
        }
    };
    let used = stats.total_memory.saturating_sub(stats.available_memory);

    let mut out = String::from("*System Status*\n\n*Bot*\n");
    let _ = writeln!(out, "Uptime: {uptime}");
    let _ = writeln!(out, "Memory: {:.2} MB", mib(stats.process_memory));
    let _ = writeln!(out, "Commands Loaded: {commands}");
    let _ = writeln!(out, "Prefix: {prefix}");
    let _ = writeln!(out, "\n*Host*");
    let _ = writeln!(out, "Platform: {}", or_unknown(&stats.os));
    let _ = writeln!(out, "Kernel: {}", or_unknown(&stats.kernel));
    let _ = writeln!(out, "CPU: {}", or_unknown(&stats.cpu_brand));
    let _ = writeln!(out, "Cores: {}", stats.cpu_cores);
    let _ = writeln!(out, "Total RAM: {:.2} GB", gib(stats.total_memory));
    let _ = writeln!(out, "Used RAM: {:.2} GB", gib(used));
    let _ = write!(out, "Free RAM: {:.2} GB", gib(stats.available_memory));
    out
}

struct SystemStatus(Arc<Info>);

#[async_trait]
impl CommandHandler for SystemStatus {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        let stats = tokio::task::spawn_blocking(HostStats::collect).await?;
        let text = format!(
            "{}\nMode: {}",
            render_system(&stats, &self.0.uptime(), ctx.registry().len(), &ctx.prefix),
            ctx.mode.as_str()
        );
        ctx.reply(text).await?;
        Ok(())
    }
}

struct Menu(Arc<Info>);

#[async_trait]
impl CommandHandler for Menu {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        ctx.reply(render_menu(ctx.registry(), &self.0.bot_name, &ctx.prefix, msg))
            .await?;
        Ok(())
    }
}

/// Full menu text. Group administration is hidden outside groups.
pub fn render_menu(
    registry: &CommandRegistry,
    bot_name: &str,
    prefix: &str,
    msg: &NormalizedMessage,
) -> String {
    let mut out = String::new();
    let who = msg.push_name.as_deref().unwrap_or("there");
    let _ = writeln!(out, "Hello {who}!\n");
    let _ = writeln!(out, "*{bot_name}*  prefix `{prefix}`\n");

    for (category, commands) in registry.listed_by_category() {
        if category == "group" && !msg.is_group {
            continue;
        }
        let _ = writeln!(out, "*{}*", category.to_uppercase());
        for d in commands {
            let aliases = if d.aliases.is_empty() {
                String::new()
            } else {
                format!(" ({})", d.aliases.join(", "))
            };
            let _ = writeln!(out, "• {prefix}{}{aliases}", d.pattern);
            if let Some(desc) = &d.description {
                let _ = writeln!(out, "   {desc}");
            }
        }
        out.push('\n');
    }

    let _ = write!(out, "Use {prefix}help <command> for details.");
    out
}

struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        let p = &ctx.prefix;
        let wanted = ctx.args.trim();
        if wanted.is_empty() {
            ctx.reply(format!("Please name a command.\nExample: {p}help alive"))
                .await?;
            return Ok(());
        }

        let keyword = wanted.strip_prefix(p.as_str()).unwrap_or(wanted);
        let Some(d) = ctx.registry().find_by_keyword(keyword) else {
            ctx.reply(format!(
                "Command \"{wanted}\" not found.\nUse {p}menu to see all commands."
            ))
            .await?;
            return Ok(());
        };

        let mut text = format!("*{p}{}*\n\n", d.pattern);
        let _ = writeln!(
            text,
            "Description: {}",
            d.description.as_deref().unwrap_or("No description")
        );
        if !d.aliases.is_empty() {
            let _ = writeln!(text, "Aliases: {}", d.aliases.join(", "));
        }
        let _ = writeln!(text, "Category: {}", d.category);
        match &d.usage {
            Some(usage) => {
                let _ = write!(text, "Usage: {p}{usage}");
            }
            None => {
                let _ = write!(text, "Usage: {p}{}", d.pattern);
            }
        }
        ctx.reply(text).await?;
        Ok(())
    }
}

struct QuickList;

#[async_trait]
impl CommandHandler for QuickList {
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        let mut sections = vec![("main", 10), ("download", 5)];
        if msg.is_group {
            sections.push(("group", 5));
        }

        let listed = ctx.registry().listed_by_category();
        let mut text = String::from("*Quick Command List*\n");
        for (category, limit) in sections {
            let Some((_, commands)) = listed.iter().find(|(c, _)| c == category) else {
                continue;
            };
            let names: Vec<String> = commands
                .iter()
                .take(limit)
                .map(|d| format!("{}{}", ctx.prefix, d.pattern))
                .collect();
            let _ = write!(text, "\n*{}*: {}", category.to_uppercase(), names.join(" "));
        }
        let _ = write!(text, "\n\nFull list: {}menu", ctx.prefix);
        ctx.reply(text).await?;
        Ok(())
    }
}
