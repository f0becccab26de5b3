//! The uniform handler contract every command implements.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use nova_message::{NormalizedMessage, RawEnvelope};

use crate::context::InvocationContext;
use crate::transport::Transport;

/// A command or passive handler.
///
/// Errors are reported back to the dispatcher, which logs them; handlers that
/// want the user to see a failure reply themselves before returning.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        transport: &dyn Transport,
        raw: &RawEnvelope,
        msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()>;
}

/// Adapter so a closure over an owned [`InvocationContext`] can be registered.
struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(
        &self,
        _transport: &dyn Transport,
        _raw: &RawEnvelope,
        _msg: &NormalizedMessage,
        ctx: &InvocationContext,
    ) -> anyhow::Result<()> {
        (self.0)(ctx.clone()).await
    }
}

/// Wrap a closure as a handler. The context carries the message and transport.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
