//! File-backed trigger → response maps.
//!
//! One JSON object per response kind (`autovoice.json`, `autosticker.json`,
//! `autoreply.json`) in the data directory. Files are re-read on every
//! lookup so edits made on disk take effect without a restart. Writes go
//! through a temporary file and a rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::StoreError;

pub const BACKUP_FILE: &str = "autoresponse_backup.json";

pub type ResponseMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Voice,
    Sticker,
    Reply,
}

impl ResponseKind {
    pub const ALL: [ResponseKind; 3] = [
        ResponseKind::Voice,
        ResponseKind::Sticker,
        ResponseKind::Reply,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "voice" => Some(ResponseKind::Voice),
            "sticker" => Some(ResponseKind::Sticker),
            "reply" => Some(ResponseKind::Reply),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Voice => "voice",
            ResponseKind::Sticker => "sticker",
            ResponseKind::Reply => "reply",
        }
    }

    /// File stem, also the key used inside the backup file.
    pub fn stem(&self) -> &'static str {
        match self {
            ResponseKind::Voice => "autovoice",
            ResponseKind::Sticker => "autosticker",
            ResponseKind::Reply => "autoreply",
        }
    }

    /// Voice and sticker responses are media URLs.
    pub fn requires_url(&self) -> bool {
        !matches!(self, ResponseKind::Reply)
    }
}

/// Result of an `add` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// A trigger with the same normalized text exists.
    Duplicate,
    /// Media kinds need a response starting with `http`.
    NotAUrl,
}

fn normalize_trigger(s: &str) -> String {
    s.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct AutoResponseStore {
    dir: PathBuf,
}

impl AutoResponseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: ResponseKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.stem()))
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    /// Create the data directory and any missing response file.
    pub async fn ensure(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
        for kind in ResponseKind::ALL {
            let path = self.path(kind);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                self.save(kind, &ResponseMap::new()).await?;
                debug!(path = %path.display(), "created empty response file");
            }
        }
        Ok(())
    }

    /// Read one map. Missing, empty or invalid files read as empty.
    pub async fn load(&self, kind: ResponseKind) -> ResponseMap {
        let path = self.path(kind);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "cannot read response file");
                }
                return ResponseMap::new();
            }
        };
        if text.trim().is_empty() {
            return ResponseMap::new();
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => string_entries(&value),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "invalid response file, treating as empty"
                );
                ResponseMap::new()
            }
        }
    }

    async fn save(&self, kind: ResponseKind, map: &ResponseMap) -> Result<(), StoreError> {
        write_json(&self.path(kind), &serde_json::to_value(map)?).await
    }

    /// Response for a message body, compared lower-cased and trimmed.
    pub async fn lookup(&self, kind: ResponseKind, body: &str) -> Option<String> {
        let body = normalize_trigger(body);
        if body.is_empty() {
            return None;
        }
        self.load(kind)
            .await
            .into_iter()
            .find(|(trigger, _)| normalize_trigger(trigger) == body)
            .map(|(_, response)| response)
    }

    pub async fn add(
        &self,
        kind: ResponseKind,
        trigger: &str,
        response: &str,
    ) -> Result<AddOutcome, StoreError> {
        if kind.requires_url() && !response.starts_with("http") {
            return Ok(AddOutcome::NotAUrl);
        }
        let mut map = self.load(kind).await;
        let wanted = normalize_trigger(trigger);
        if map.keys().any(|k| normalize_trigger(k) == wanted) {
            return Ok(AddOutcome::Duplicate);
        }
        map.insert(trigger.trim().to_string(), response.trim().to_string());
        self.save(kind, &map).await?;
        Ok(AddOutcome::Added)
    }

    /// Remove a trigger. Returns `false` when it was not present.
    pub async fn remove(&self, kind: ResponseKind, trigger: &str) -> Result<bool, StoreError> {
        let mut map = self.load(kind).await;
        let wanted = normalize_trigger(trigger);
        let Some(key) = map.keys().find(|k| normalize_trigger(k) == wanted).cloned() else {
            return Ok(false);
        };
        map.remove(&key);
        self.save(kind, &map).await?;
        Ok(true)
    }

    /// Write all three maps into the backup file.
    pub async fn backup(&self) -> Result<PathBuf, StoreError> {
        let mut all = serde_json::Map::new();
        for kind in ResponseKind::ALL {
            all.insert(kind.stem().to_string(), serde_json::to_value(self.load(kind).await)?);
        }
        let path = self.backup_path();
        write_json(&path, &Value::Object(all)).await?;
        Ok(path)
    }

    /// Replace the maps present in the backup file. Returns how many entries were restored.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let path = self.backup_path();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NoBackup(path))
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let backup: Value = serde_json::from_str(&text)?;

        let mut restored = 0;
        for kind in ResponseKind::ALL {
            if let Some(section) = backup.get(kind.stem()) {
                let map = string_entries(section);
                restored += map.len();
                self.save(kind, &map).await?;
            }
        }
        Ok(restored)
    }
}

/// String-valued entries of a JSON object; anything else is dropped.
fn string_entries(value: &Value) -> ResponseMap {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

async fn write_json(path: &Path, value: &Value) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let io = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&tmp, text).await.map_err(io)?;
    tokio::fs::rename(&tmp, path).await.map_err(io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, AutoResponseStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AutoResponseStore::new(dir.path().join("data"));
        (dir, store)
    }

    #[tokio::test]
    async fn ensure_creates_empty_files() {
        let (_dir, store) = store();
        store.ensure().await.unwrap();
        for kind in ResponseKind::ALL {
            let text = std::fs::read_to_string(store.path(kind)).unwrap();
            assert_eq!(text.trim(), "{}");
            assert!(store.load(kind).await.is_empty());
        }
    }

    #[tokio::test]
    async fn lookup_is_exact_after_normalizing() {
        let (_dir, store) = store();
        store.ensure().await.unwrap();
        assert_eq!(
            store.add(ResponseKind::Reply, " Good Morning ", "gm!").await.unwrap(),
            AddOutcome::Added
        );
        assert_eq!(
            store.lookup(ResponseKind::Reply, "good morning").await.as_deref(),
            Some("gm!")
        );
        assert_eq!(
            store.lookup(ResponseKind::Reply, "  GOOD MORNING\n").await.as_deref(),
            Some("gm!")
        );
        assert!(store.lookup(ResponseKind::Reply, "good morning all").await.is_none());
        assert!(store.lookup(ResponseKind::Reply, "").await.is_none());
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_non_urls() {
        let (_dir, store) = store();
        store.ensure().await.unwrap();
        assert_eq!(
            store.add(ResponseKind::Voice, "hi", "not a url").await.unwrap(),
            AddOutcome::NotAUrl
        );
        assert_eq!(
            store.add(ResponseKind::Voice, "hi", "https://x/hi.mp3").await.unwrap(),
            AddOutcome::Added
        );
        assert_eq!(
            store.add(ResponseKind::Voice, "HI", "https://x/other.mp3").await.unwrap(),
            AddOutcome::Duplicate
        );
        assert!(store.remove(ResponseKind::Voice, "Hi").await.unwrap());
        assert!(!store.remove(ResponseKind::Voice, "hi").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_file_reads_as_empty() {
        let (_dir, store) = store();
        store.ensure().await.unwrap();
        std::fs::write(store.path(ResponseKind::Sticker), "{not json").unwrap();
        assert!(store.load(ResponseKind::Sticker).await.is_empty());
        std::fs::write(store.path(ResponseKind::Sticker), r#"{"a": 1, "b": "https://s"}"#).unwrap();
        let map = store.load(ResponseKind::Sticker).await;
        assert_eq!(map.len(), 1);
        assert_eq!(map["b"], "https://s");
    }

    #[tokio::test]
    async fn backup_and_restore() {
        let (_dir, store) = store();
        store.ensure().await.unwrap();
        assert!(matches!(store.restore().await, Err(StoreError::NoBackup(_))));

        store.add(ResponseKind::Reply, "hi", "hello").await.unwrap();
        store.add(ResponseKind::Sticker, "lol", "https://s/lol.webp").await.unwrap();
        let path = store.backup().await.unwrap();
        assert!(path.ends_with(BACKUP_FILE));

        store.remove(ResponseKind::Reply, "hi").await.unwrap();
        store.add(ResponseKind::Reply, "bye", "see you").await.unwrap();

        assert_eq!(store.restore().await.unwrap(), 2);
        assert_eq!(store.lookup(ResponseKind::Reply, "hi").await.as_deref(), Some("hello"));
        assert!(store.lookup(ResponseKind::Reply, "bye").await.is_none());
    }

    #[tokio::test]
    async fn restore_ignores_unknown_sections() {
        let (_dir, store) = store();
        store.ensure().await.unwrap();
        std::fs::write(
            store.backup_path(),
            r#"{"autoreply": {"x": "y"}, "../escape": {"a": "b"}}"#,
        )
        .unwrap();
        assert_eq!(store.restore().await.unwrap(), 1);
        assert!(!store.dir().join("../escape.json").exists());
    }
}
