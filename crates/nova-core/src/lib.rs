pub mod config;
pub mod error;
pub mod jid;

pub use config::NovaConfig;
pub use error::{NovaError, Result};
