//! Built-in plugins and the isolated plugin loader.
//!
//! Each plugin registers its commands into the shared
//! [`CommandRegistry`](nova_commands::CommandRegistry) at startup. A plugin
//! that fails to register is rolled back and reported; the rest still load.

pub mod admin;
pub mod autoresponse;
pub mod error;
pub mod general;
pub mod loader;

pub use error::PluginError;
pub use loader::{builtin, LoadReport, LoadedPlugin, Plugin, PluginLoader};
