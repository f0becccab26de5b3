use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use nova_commands::{CommandRegistry, DispatchSettings, Dispatcher};
use nova_core::{config::NovaConfig, NovaError};
use nova_plugins::LoadReport;

mod app;
mod bridge;
mod http;

/// WhatsApp command bot gateway.
#[derive(Debug, Parser)]
#[command(name = "nova-gateway", version, about)]
struct Cli {
    /// Config file path (overrides NOVA_CONFIG and ~/.nova/nova.toml).
    #[arg(long, short)]
    config: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Load config and plugins, print the load report, then exit (non-zero if a plugin failed).
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // load config: --config > NOVA_CONFIG env > ~/.nova/nova.toml
    // A missing file means defaults; a file or override that fails to parse is fatal.
    let config = NovaConfig::load(cli.config.as_deref()).inspect_err(|e| {
        error!(code = e.code(), error = %e, "config rejected");
    })?;

    let mut registry = CommandRegistry::new();
    let report = nova_plugins::builtin(&config).load(&mut registry).await;
    log_report(&report);

    if cli.check {
        print_report(&report, &registry);
        // first failure decides the exit status
        if let Some(failure) = report.failed.into_iter().next() {
            return Err(NovaError::from(failure).into());
        }
        return Ok(());
    }

    let transport = Arc::new(bridge::BridgeTransport::new(&config.bridge)?);
    let identity = transport.identity_with_backoff().await?;

    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        transport,
        DispatchSettings::from(&config),
        identity,
    );
    info!(
        bot = %config.bot.name,
        identity = %dispatcher.bot_identity(),
        prefix = %config.bot.prefix,
        mode = config.bot.mode.as_str(),
        "dispatcher ready"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(app::AppState::new(config, Arc::new(dispatcher)));
    let router = app::build_router(state);

    info!("Nova gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "nova_gateway=info,nova_commands=info,nova_plugins=info,tower_http=debug".into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn log_report(report: &LoadReport) {
    for failure in &report.failed {
        warn!(plugin = failure.plugin(), error = %failure, "plugin skipped");
    }
    info!(
        plugins = report.loaded.len(),
        failed = report.failed.len(),
        commands = report.total_commands(),
        "plugins loaded"
    );
}

fn print_report(report: &LoadReport, registry: &CommandRegistry) {
    for plugin in &report.loaded {
        println!("ok      {:<14} {} command(s)", plugin.name, plugin.commands);
    }
    for failure in &report.failed {
        println!("FAILED  {failure}");
    }
    for (category, commands) in registry.listed_by_category() {
        let names: Vec<&str> = commands.iter().map(|c| c.pattern.as_str()).collect();
        println!("[{category}] {}", names.join(", "));
    }
}
