//! Plugin contract and the isolated loader.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use nova_commands::{CommandRegistry, RegistryError};
use nova_core::NovaConfig;

use crate::admin::AdminPlugin;
use crate::autoresponse::AutoResponsePlugin;
use crate::error::PluginError;
use crate::general::GeneralPlugin;

/// A unit of functionality that contributes commands.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable lowercase name, recorded as the source of each command.
    fn name(&self) -> &str;

    /// Prepare plugin state before registration.
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn register(&self, registry: &mut CommandRegistry) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlugin {
    pub name: String,
    pub commands: usize,
}

/// Outcome of loading every plugin.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedPlugin>,
    pub failed: Vec<PluginError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total_commands(&self) -> usize {
        self.loaded.iter().map(|p| p.commands).sum()
    }
}

/// Loads plugins one at a time. A failing plugin is rolled back and reported;
/// it never stops the others.
#[derive(Default)]
pub struct PluginLoader {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub async fn load(&self, registry: &mut CommandRegistry) -> LoadReport {
        let mut report = LoadReport::default();

        for plugin in &self.plugins {
            let name = plugin.name().to_string();

            if let Err(e) = plugin.init().await {
                error!(plugin = %name, error = %e, "plugin init failed");
                report.failed.push(PluginError::Init {
                    plugin: name,
                    reason: format!("{e:#}"),
                });
                continue;
            }

            let mark = registry.checkpoint();
            let before = registry.len();
            match plugin.register(registry) {
                Ok(()) => {
                    let commands = registry.len() - before;
                    info!(plugin = %name, commands, "plugin loaded");
                    report.loaded.push(LoadedPlugin { name, commands });
                }
                Err(e) => {
                    let removed = registry.rollback(mark);
                    error!(
                        plugin = %name,
                        error = %e,
                        rolled_back = removed,
                        "plugin failed to load"
                    );
                    report.failed.push(PluginError::Registration {
                        plugin: name,
                        source: e,
                    });
                }
            }
        }

        report
    }
}

/// The built-in plugin set, configured from `config`.
pub fn builtin(config: &NovaConfig) -> PluginLoader {
    PluginLoader::new()
        .with(Arc::new(GeneralPlugin::new(config)))
        .with(Arc::new(AutoResponsePlugin::new(&config.autoresponse)))
        .with(Arc::new(AdminPlugin::new()))
}
