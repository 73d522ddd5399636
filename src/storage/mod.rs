//! Durable key-value storage behind a small contract.
//!
//! Two consumers: the job scheduler (one document per job transition) and
//! the result cache (mirror documents with absolute expiry). Backends are
//! interchangeable behind [`KeyValueStore`]; the shipped backend writes JSON
//! files into a hash-prefixed directory tree.

mod file;

pub use file::FileStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ScrapeError;

/// Simple durable save/get/list/delete contract.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Persist a JSON document under `key`, replacing any prior value.
    async fn save(&self, key: &str, value: &Value) -> Result<(), ScrapeError>;

    /// Fetch a document; a miss is `None`, not an error.
    async fn get(&self, key: &str) -> Result<Option<Value>, ScrapeError>;

    /// Remove a document. Removing a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), ScrapeError>;

    /// List stored keys, optionally restricted to a prefix.
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, ScrapeError>;

    /// Delete every key matching the prefix (or everything).
    async fn clear(&self, prefix: Option<&str>) -> Result<(), ScrapeError>;
}
