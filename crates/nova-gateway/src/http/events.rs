//! Inbound message events: POST /events/messages.
//!
//! The bridge forwards every Baileys `messages.upsert` batch here. Requests
//! are authenticated according to `NovaConfig::webhook`; live (`notify`)
//! batches are fanned out to the dispatcher, one task per message.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::AppState;
use nova_core::config::{WebhookAuthMode, WebhookConfig};
use nova_message::UpsertBatch;

type HmacSha256 = Hmac<Sha256>;

/// POST /events/messages
///
/// Returns 202 + receipt ID once the batch is handed off, 401 on auth failure,
/// 400 when the body is not a message batch. Dispatch results are only logged.
pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    authenticate(&state.config.webhook, &headers, &body).map_err(|e| {
        warn!(reason = %e, "event authentication failed");
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "authentication failed", "reason": e.to_string()})),
        )
    })?;

    let batch = UpsertBatch::parse(&body).map_err(|e| {
        warn!(error = %e, bytes = body.len(), "rejecting malformed message batch");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid message batch", "reason": e.to_string()})),
        )
    })?;

    let receipt_id = uuid::Uuid::new_v4().to_string();

    if !batch.is_notify() {
        debug!(
            receipt_id = %receipt_id,
            kind = %batch.kind,
            count = batch.messages.len(),
            "ignoring history batch"
        );
        return Ok(accepted(&receipt_id, 0));
    }

    let count = batch.messages.len();
    for raw in batch.messages {
        let dispatcher = Arc::clone(&state.dispatcher);
        tokio::spawn(async move {
            let id = raw.key.id.clone();
            let report = dispatcher.dispatch(raw).await;
            debug!(message_id = %id, ?report, "dispatch cycle finished");
        });
    }
    state.record_accepted(count);

    info!(receipt_id = %receipt_id, accepted = count, "message batch accepted");
    Ok(accepted(&receipt_id, count))
}

fn accepted(receipt_id: &str, count: usize) -> (StatusCode, Json<Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({"ok": true, "receipt_id": receipt_id, "accepted": count})),
    )
}

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Why the bridge's event request was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("webhook auth is enabled but no secret is configured")]
    NoSecret,

    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("malformed {0} header")]
    MalformedHeader(&'static str),

    #[error("signature does not match the request body")]
    BadSignature,

    #[error("bearer token mismatch")]
    BadToken,
}

/// Check an event request from the bridge against `[webhook]`.
///
/// Signed mode expects `sha256=<hex>` over the raw body; token mode expects
/// `Authorization: Bearer <secret>`. An empty secret counts as missing.
pub fn authenticate(
    cfg: &WebhookConfig,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), AuthError> {
    if cfg.auth_mode == WebhookAuthMode::None {
        return Ok(());
    }
    let secret = cfg
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::NoSecret)?;

    match cfg.auth_mode {
        WebhookAuthMode::HmacSha256 => {
            let signature = header(headers, SIGNATURE_HEADER)?
                .strip_prefix("sha256=")
                .and_then(|h| hex::decode(h).ok())
                .ok_or(AuthError::MalformedHeader(SIGNATURE_HEADER))?;
            let mut mac =
                HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::NoSecret)?;
            mac.update(body);
            mac.verify_slice(&signature)
                .map_err(|_| AuthError::BadSignature)
        }
        WebhookAuthMode::BearerToken => {
            let token = header(headers, "authorization")?
                .strip_prefix("Bearer ")
                .ok_or(AuthError::MalformedHeader("authorization"))?;
            if token == secret {
                Ok(())
            } else {
                Err(AuthError::BadToken)
            }
        }
        WebhookAuthMode::None => Ok(()),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingHeader(name))
}
