use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check with server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bot": state.config.bot.name,
        "mode": state.config.bot.mode.as_str(),
        "commands": state.dispatcher.registry().len(),
        "messages_accepted": state.accepted_total(),
    }))
}
