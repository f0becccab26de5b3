use thiserror::Error;

/// Startup failures surfaced by the gateway binary.
#[derive(Debug, Error)]
pub enum NovaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Plugin error ({plugin}): {reason}")]
    Plugin { plugin: String, reason: String },
}

impl NovaError {
    /// Short error code string, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            NovaError::Config(_) => "CONFIG_ERROR",
            NovaError::Plugin { .. } => "PLUGIN_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, NovaError>;
