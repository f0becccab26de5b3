use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{
    de::{self, SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use std::fmt;

pub const DEFAULT_PREFIX: &str = ".";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_BRIDGE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GROUP_CACHE_SECS: u64 = 30;

/// Top-level config (nova.toml + NOVA_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NovaConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub autoresponse: AutoResponseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Who may run explicit (prefixed) commands. Passive triggers ignore the mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    /// Everyone, everywhere.
    #[default]
    Public,
    /// Owners only.
    Private,
    /// Owners, plus anyone in a direct chat.
    Inbox,
    /// Owners, plus anyone in a group chat.
    Groups,
}

impl BotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotMode::Public => "public",
            BotMode::Private => "private",
            BotMode::Inbox => "inbox",
            BotMode::Groups => "groups",
        }
    }

    /// Whether an explicit command may run for this sender in this kind of chat.
    pub fn permits(&self, is_owner: bool, is_group: bool) -> bool {
        if is_owner {
            return true;
        }
        match self {
            BotMode::Public => true,
            BotMode::Private => false,
            BotMode::Inbox => !is_group,
            BotMode::Groups => is_group,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    /// Command prefix; a message is an explicit command only if its body starts with it.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Bare phone numbers (no `@server`) treated as bot owners. Accepts a list,
    /// a single number or a comma-separated string, so env overrides work.
    #[serde(default, deserialize_with = "owner_list")]
    pub owner_numbers: Vec<String>,
    #[serde(default)]
    pub mode: BotMode,
    #[serde(default = "default_alive_message")]
    pub alive_message: String,
    /// Mark `status@broadcast` posts as read instead of dispatching them.
    #[serde(default = "bool_true")]
    pub auto_read_status: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            prefix: default_prefix(),
            owner_numbers: Vec::new(),
            mode: BotMode::default(),
            alive_message: default_alive_message(),
            auto_read_status: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoResponseConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "bool_true")]
    pub auto_voice: bool,
    #[serde(default = "bool_true")]
    pub auto_sticker: bool,
    #[serde(default = "bool_true")]
    pub auto_reply: bool,
    /// Do not fire auto-responses for messages sent by an owner.
    #[serde(default)]
    pub skip_owner: bool,
}

impl Default for AutoResponseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            auto_voice: true,
            auto_sticker: true,
            auto_reply: true,
            skip_owner: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_PORT,
        }
    }
}

/// The external WhatsApp bridge process that owns the socket session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    /// Bearer token sent on every bridge request.
    pub token: Option<String>,
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
    /// How long fetched group metadata stays cached.
    #[serde(default = "default_group_cache")]
    pub group_cache_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            token: None,
            timeout_secs: DEFAULT_BRIDGE_TIMEOUT_SECS,
            group_cache_secs: DEFAULT_GROUP_CACHE_SECS,
        }
    }
}

/// Authentication mode for inbound event batches posted by the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    /// HMAC-SHA256 over the raw request body (X-Hub-Signature-256).
    HmacSha256,
    /// Static bearer token in the Authorization header.
    BearerToken,
    /// No authentication; only for a bridge on loopback.
    #[default]
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub auth_mode: WebhookAuthMode,
    /// HMAC signing secret or bearer token value.
    pub secret: Option<String>,
}

fn owner_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    deserializer.deserialize_any(OwnerList)
}

struct OwnerList;

impl<'de> Visitor<'de> for OwnerList {
    type Value = Vec<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a phone number, a comma-separated string or a list of numbers")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(v.split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(vec![v.to_string()])
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(vec![v.to_string()])
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut numbers = Vec::new();
        while let Some(entry) = seq.next_element::<OwnerEntry>()? {
            numbers.extend(entry.0);
        }
        Ok(numbers)
    }
}

/// One list element: a string or a bare number.
struct OwnerEntry(Vec<String>);

impl<'de> Deserialize<'de> for OwnerEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        owner_list(deserializer).map(OwnerEntry)
    }
}

fn bool_true() -> bool {
    true
}
fn default_bot_name() -> String {
    "Nova".to_string()
}
fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}
fn default_alive_message() -> String {
    "I'm alive now!".to_string()
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bridge_url() -> String {
    DEFAULT_BRIDGE_URL.to_string()
}
fn default_bridge_timeout() -> u64 {
    DEFAULT_BRIDGE_TIMEOUT_SECS
}
fn default_group_cache() -> u64 {
    DEFAULT_GROUP_CACHE_SECS
}
fn default_data_dir() -> String {
    format!("{}/.nova/data", home_dir())
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

impl NovaConfig {
    /// Load config from a TOML file with NOVA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. NOVA_CONFIG env var
    ///   3. ~/.nova/nova.toml
    ///
    /// Nested env keys use a double underscore: `NOVA_BOT__PREFIX=!`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("NOVA_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::NovaError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("NOVA_").ignore(&["CONFIG"]).split("__"))
    }

    /// Owner numbers with everything but digits stripped.
    pub fn owner_numbers(&self) -> Vec<String> {
        self.bot
            .owner_numbers
            .iter()
            .map(|n| n.chars().filter(|c| c.is_ascii_digit()).collect::<String>())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

fn default_config_path() -> String {
    format!("{}/.nova/nova.toml", home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_when_file_missing() {
        Jail::expect_with(|_jail| {
            let config = NovaConfig::load(Some("does-not-exist.toml")).unwrap();
            assert_eq!(config.bot.prefix, ".");
            assert_eq!(config.bot.mode, BotMode::Public);
            assert!(config.bot.auto_read_status);
            assert_eq!(config.server.port, DEFAULT_PORT);
            assert_eq!(config.webhook.auth_mode, WebhookAuthMode::None);
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nova.toml",
                r#"
                [bot]
                prefix = "!"
                owner_numbers = ["+94 75 297 8237"]
                mode = "private"

                [webhook]
                auth_mode = "bearer-token"
                secret = "s3cret"
                "#,
            )?;
            jail.set_env("NOVA_BOT__NAME", "Override");
            jail.set_env("NOVA_SERVER__PORT", "9100");

            let config = NovaConfig::load(Some("nova.toml")).unwrap();
            assert_eq!(config.bot.prefix, "!");
            assert_eq!(config.bot.name, "Override");
            assert_eq!(config.bot.mode, BotMode::Private);
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.webhook.auth_mode, WebhookAuthMode::BearerToken);
            assert_eq!(config.owner_numbers(), vec!["94752978237".to_string()]);
            Ok(())
        });
    }

    #[test]
    fn owner_number_env_accepts_bare_number() {
        Jail::expect_with(|jail| {
            jail.set_env("NOVA_BOT__OWNER_NUMBERS", "94752978237");
            jail.set_env("NOVA_WEBHOOK__AUTH_MODE", "bearer-token");
            jail.set_env("NOVA_WEBHOOK__SECRET", "tok");

            let config = NovaConfig::load(Some("missing.toml")).unwrap();
            assert_eq!(config.owner_numbers(), vec!["94752978237".to_string()]);
            assert_eq!(config.webhook.auth_mode, WebhookAuthMode::BearerToken);
            Ok(())
        });
    }

    #[test]
    fn owner_number_env_accepts_list_and_comma_forms() {
        Jail::expect_with(|jail| {
            jail.set_env("NOVA_BOT__OWNER_NUMBERS", "[94752978237]");
            let config = NovaConfig::load(Some("missing.toml")).unwrap();
            assert_eq!(config.owner_numbers(), vec!["94752978237".to_string()]);

            jail.set_env("NOVA_BOT__OWNER_NUMBERS", "94752978237, +94 77 123 4567");
            let config = NovaConfig::load(Some("missing.toml")).unwrap();
            assert_eq!(
                config.owner_numbers(),
                vec!["94752978237".to_string(), "94771234567".to_string()]
            );
            Ok(())
        });
    }

    #[test]
    fn toml_owner_list_may_mix_numbers_and_strings() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "nova.toml",
                r#"
                [bot]
                owner_numbers = [94752978237, "+94 77 123 4567"]
                "#,
            )?;
            let config = NovaConfig::load(Some("nova.toml")).unwrap();
            assert_eq!(config.bot.owner_numbers.len(), 2);
            assert_eq!(config.owner_numbers()[0], "94752978237");
            Ok(())
        });
    }

    #[test]
    fn invalid_override_is_an_error() {
        Jail::expect_with(|jail| {
            jail.set_env("NOVA_SERVER__PORT", "not-a-port");
            let err = NovaConfig::load(Some("missing.toml")).unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
            Ok(())
        });
    }

    #[test]
    fn mode_permits() {
        assert!(BotMode::Public.permits(false, true));
        assert!(!BotMode::Private.permits(false, false));
        assert!(BotMode::Private.permits(true, false));
        assert!(BotMode::Inbox.permits(false, false));
        assert!(!BotMode::Inbox.permits(false, true));
        assert!(BotMode::Groups.permits(false, true));
        assert!(!BotMode::Groups.permits(false, false));
    }
}
