//! Rendition cache storage.
//!
//! [`CacheStore`] is the uniform contract over the cache backends:
//!
//! - [`FsCacheStore`]: files under a local cache directory
//! - [`ObjectCacheStore`]: objects in an S3 bucket or Azure container
//!
//! Exactly one backend is active per process, chosen by
//! [`build_cache_store`] at startup.

pub mod backends;
pub mod factory;

pub use backends::{FsCacheStore, ObjectCacheStore};
pub use factory::build_cache_store;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Write-once byte store keyed by cache key.
///
/// Entries are never mutated or evicted by this process. Concurrent writers
/// of the same key are not serialized: both may pass the existence check and
/// both may write. Every writer of a key produces the same bytes, so the race
/// is harmless.
///
/// Used as `Arc<dyn CacheStore>`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the stored bytes, or `None` if the key is absent.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>>;

    /// Whether an entry exists for `key`.
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Writes `value` unconditionally. Callers should use [`set`](CacheStore::set).
    async fn put(&self, key: &str, value: Bytes) -> anyhow::Result<()>;

    /// Stores `value` unless it is empty or the key already exists.
    ///
    /// First writer wins. An error from the existence check is treated as
    /// "absent" and the write is attempted.
    async fn set(&self, key: &str, value: Bytes) -> anyhow::Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        match self.exists(key).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(err) => debug!(key, error = %err, "existence check failed, writing anyway"),
        }
        self.put(key, value).await
    }

    /// No-op: renditions are only ever removed out of band.
    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}
