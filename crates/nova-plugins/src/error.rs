use std::path::PathBuf;

use thiserror::Error;

use nova_commands::RegistryError;
use nova_core::NovaError;

#[derive(Debug, Error)]
pub enum PluginError {
    /// A command the plugin tried to register was rejected.
    #[error("plugin `{plugin}` failed to register: {source}")]
    Registration {
        plugin: String,
        #[source]
        source: RegistryError,
    },

    #[error("plugin `{plugin}` failed to initialise: {reason}")]
    Init { plugin: String, reason: String },
}

impl PluginError {
    /// Name of the plugin that failed.
    pub fn plugin(&self) -> &str {
        match self {
            PluginError::Registration { plugin, .. } | PluginError::Init { plugin, .. } => plugin,
        }
    }
}

impl From<PluginError> for NovaError {
    fn from(e: PluginError) -> Self {
        let reason = match &e {
            PluginError::Registration { source, .. } => source.to_string(),
            PluginError::Init { reason, .. } => reason.clone(),
        };
        NovaError::Plugin {
            plugin: e.plugin().to_string(),
            reason,
        }
    }
}

/// Errors from the file-backed auto-response store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no backup found at {0}")]
    NoBackup(PathBuf),
}
