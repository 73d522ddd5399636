//! File-backed key-value store.
//!
//! Keys are hashed to filesystem-safe names and sharded into two-level
//! directories by hash prefix: `{root}/{hash[0..2]}/{hash}.json`. Each file
//! holds an envelope carrying the original key, so listing can recover it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::ScrapeError;

use super::KeyValueStore;

#[derive(Serialize, Deserialize)]
struct Envelope {
    key: String,
    value: Value,
}

/// JSON-file store rooted at a data directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// `{root}/{hash[0..2]}/{hash}.json`
    fn path_for(&self, key: &str) -> PathBuf {
        let hash = Self::hash_key(key);
        self.root.join(&hash[..2]).join(format!("{hash}.json"))
    }

    fn read_envelope(path: &Path) -> Option<Envelope> {
        let bytes = std::fs::read(path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(env) => Some(env),
            Err(e) => {
                warn!("Skipping unreadable store document {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Walk every stored envelope under the root.
    fn envelopes(&self) -> Vec<(PathBuf, Envelope)> {
        let mut out = Vec::new();
        let Ok(shards) = std::fs::read_dir(&self.root) else {
            return out;
        };
        for shard in shards.flatten() {
            let Ok(files) = std::fs::read_dir(shard.path()) else {
                continue;
            };
            for file in files.flatten() {
                let path = file.path();
                if path.extension().is_some_and(|e| e == "json") {
                    if let Some(env) = Self::read_envelope(&path) {
                        out.push((path, env));
                    }
                }
            }
        }
        out
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn save(&self, key: &str, value: &Value) -> Result<(), ScrapeError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ScrapeError::Infrastructure(format!("create {}: {e}", parent.display())))?;
        }
        let envelope = Envelope {
            key: key.to_string(),
            value: value.clone(),
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| ScrapeError::Infrastructure(format!("serialize '{key}': {e}")))?;
        std::fs::write(&path, bytes)
            .map_err(|e| ScrapeError::Infrastructure(format!("write {}: {e}", path.display())))
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, ScrapeError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Self::read_envelope(&path).map(|env| env.value))
    }

    async fn delete(&self, key: &str) -> Result<(), ScrapeError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScrapeError::Infrastructure(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, ScrapeError> {
        let mut keys: Vec<String> = self
            .envelopes()
            .into_iter()
            .map(|(_, env)| env.key)
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self, prefix: Option<&str>) -> Result<(), ScrapeError> {
        for (path, env) in self.envelopes() {
            if prefix.is_none_or(|p| env.key.starts_with(p)) {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("Failed to clear {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }
}
