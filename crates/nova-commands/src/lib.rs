//! Command registry and dispatch for the bot.
//!
//! Plugins register [`CommandSpec`]s into a [`CommandRegistry`]; the
//! [`Dispatcher`] normalizes each inbound envelope, runs every passive
//! handler, resolves at most one explicit command and invokes it through a
//! supervised call so no handler failure escapes the dispatch cycle.

pub mod context;
pub mod dispatch;
pub mod handler;
pub mod registry;
pub mod role;
pub mod transport;

pub use context::InvocationContext;
pub use dispatch::{
    parse_invocation, supervise, CommandOutcome, DispatchReport, DispatchSettings, Dispatcher,
    HandlerFailure, SkipReason,
};
pub use handler::{handler_fn, CommandHandler};
pub use registry::{
    Checkpoint, CommandDescriptor, CommandRegistry, CommandSpec, RegistryError, TriggerType,
};
pub use role::Roles;
pub use transport::{
    AdminRole, BlockAction, GroupMetadata, GroupSetting, Participant, ParticipantAction,
    Transport, TransportError,
};
