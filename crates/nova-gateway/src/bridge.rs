//! HTTP client for the external WhatsApp bridge.
//!
//! The bridge process owns the socket session, encryption and media upload.
//! This module speaks its small JSON API and presents it as a [`Transport`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use nova_commands::{
    BlockAction, GroupMetadata, GroupSetting, ParticipantAction, Transport, TransportError,
};
use nova_core::config::BridgeConfig;
use nova_message::{MessageKey, OutgoingContent, Presence};

/// Identity lookups made at startup before giving up on the bridge.
const STARTUP_LOOKUPS: u32 = 10;

/// Wait schedule between startup identity lookups. The bridge may still be
/// pairing or restoring its session when the gateway starts.
#[derive(Debug)]
struct StartupBackoff {
    next_secs: u64,
}

impl StartupBackoff {
    const FIRST_SECS: u64 = 5;
    const CAP_SECS: u64 = 300;

    fn new() -> Self {
        Self {
            next_secs: Self::FIRST_SECS,
        }
    }

    /// Next wait: doubles up to the cap, plus a random tenth on top so
    /// gateways restarted together do not poll the bridge in step.
    fn next_wait(&mut self) -> Duration {
        let base = self.next_secs;
        self.next_secs = (base * 2).min(Self::CAP_SECS);
        let spread = u128::from(base / 10);
        let extra = uuid::Uuid::new_v4().as_u128() % (spread + 1);
        Duration::from_secs(base + extra as u64)
    }
}

/// [`Transport`] backed by the bridge's HTTP API.
pub struct BridgeTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    group_ttl: Duration,
    /// group JID -> (fetched at, metadata)
    groups: DashMap<String, (Instant, GroupMetadata)>,
}

impl BridgeTransport {
    pub fn new(config: &BridgeConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            timeout,
            group_ttl: Duration::from_secs(config.group_cache_secs),
            groups: DashMap::new(),
        })
    }

    /// Ask the bridge who we are, waiting for it to come up if needed.
    ///
    /// Gives up after [`STARTUP_LOOKUPS`] failed lookups and returns the last error.
    pub async fn identity_with_backoff(&self) -> Result<String, TransportError> {
        let mut backoff = StartupBackoff::new();
        let mut lookup = 1;
        loop {
            match self.own_identity().await {
                Ok(identity) => {
                    info!(identity = %identity, lookup, "bridge session ready");
                    return Ok(identity);
                }
                Err(e) if lookup >= STARTUP_LOOKUPS => {
                    warn!(lookups = lookup, error = %e, "bridge never reported a session");
                    return Err(e);
                }
                Err(e) => {
                    let wait = backoff.next_wait();
                    warn!(
                        lookup,
                        error = %e,
                        wait_secs = wait.as_secs(),
                        "bridge has no session yet"
                    );
                    sleep(wait).await;
                    lookup += 1;
                }
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and decode the JSON answer. An empty body reads as `null`.
    async fn execute(&self, req: RequestBuilder) -> Result<Value, TransportError> {
        let resp = req.send().await.map_err(|e| self.classify(e))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        let bytes = resp.bytes().await.map_err(|e| self.classify(e))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        self.execute(self.request(Method::POST, path).json(&body))
            .await
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.timeout.as_millis() as u64,
            }
        } else {
            TransportError::Unavailable(e.to_string())
        }
    }

    fn cached_group(&self, group: &str) -> Option<GroupMetadata> {
        let entry = self.groups.get(group)?;
        let (fetched, meta) = entry.value();
        if fetched.elapsed() < self.group_ttl {
            Some(meta.clone())
        } else {
            None
        }
    }

    fn invalidate_group(&self, group: &str) {
        self.groups.remove(group);
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn own_identity(&self) -> Result<String, TransportError> {
        let body = self.execute(self.request(Method::GET, "/me")).await?;
        body.get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| TransportError::Decode("`/me` answered without an id".to_string()))
    }

    async fn send(
        &self,
        to: &str,
        content: OutgoingContent,
        quoted: Option<&MessageKey>,
    ) -> Result<MessageKey, TransportError> {
        let kind = content.kind();
        let mut body = json!({ "jid": to, "content": content.to_baileys() });
        if let Some(key) = quoted {
            body["quoted"] = json!(key);
        }
        let answer = self.post("/messages", body).await?;
        let key = answer
            .get("key")
            .map(MessageKey::from_value)
            .ok_or_else(|| TransportError::Decode("send answered without a key".to_string()))?;
        debug!(chat = %to, kind, id = %key.id, "message sent");
        Ok(key)
    }

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, TransportError> {
        if let Some(meta) = self.cached_group(group) {
            return Ok(meta);
        }
        let body = self
            .execute(self.request(Method::GET, &format!("/groups/{group}")))
            .await?;
        let meta: GroupMetadata =
            serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        self.groups
            .insert(group.to_string(), (Instant::now(), meta.clone()));
        Ok(meta)
    }

    async fn mark_read(&self, key: &MessageKey) -> Result<(), TransportError> {
        self.post("/read", json!({ "keys": [key] })).await?;
        Ok(())
    }

    async fn send_presence(&self, chat: &str, presence: Presence) -> Result<(), TransportError> {
        self.post(
            "/presence",
            json!({ "jid": chat, "presence": presence.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn update_block_status(
        &self,
        identity: &str,
        action: BlockAction,
    ) -> Result<(), TransportError> {
        self.post("/block", json!({ "jid": identity, "action": action }))
            .await?;
        Ok(())
    }

    async fn group_participants_update(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), TransportError> {
        self.post(
            &format!("/groups/{group}/participants"),
            json!({ "participants": participants, "action": action }),
        )
        .await?;
        self.invalidate_group(group);
        Ok(())
    }

    async fn group_setting_update(
        &self,
        group: &str,
        setting: GroupSetting,
    ) -> Result<(), TransportError> {
        self.post(
            &format!("/groups/{group}/settings"),
            json!({ "setting": setting }),
        )
        .await?;
        Ok(())
    }

    async fn group_leave(&self, group: &str) -> Result<(), TransportError> {
        self.post(&format!("/groups/{group}/leave"), json!({}))
            .await?;
        self.invalidate_group(group);
        Ok(())
    }
}
