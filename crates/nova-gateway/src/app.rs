use axum::{
    routing::{get, post},
    Router,
};
use nova_commands::Dispatcher;
use nova_core::config::NovaConfig;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: NovaConfig,
    pub dispatcher: Arc<Dispatcher>,
    /// Inbound message envelopes handed to the dispatcher since startup.
    pub messages_accepted: AtomicU64,
}

impl AppState {
    pub fn new(config: NovaConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            messages_accepted: AtomicU64::new(0),
        }
    }

    pub fn record_accepted(&self, count: usize) {
        self.messages_accepted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn accepted_total(&self) -> u64 {
        self.messages_accepted.load(Ordering::Relaxed)
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/events/messages",
            post(crate::http::events::messages_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
