//! Startup selection of the rendition cache backend.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::service::config::{CacheBackendKind, ServerConfig};
use crate::storage::backends::{build_azure, build_s3, FsCacheStore, ObjectBackend, ObjectCacheStore};
use crate::storage::CacheStore;

/// Builds the cache backend selected by `config`.
///
/// S3 is used when a bucket is configured, then Azure when a container is
/// configured, otherwise the filesystem under `cache_dir`.
///
/// # Errors
///
/// Returns an error if the object storage client cannot be built or the
/// cache directory cannot be created. Callers treat this as fatal.
pub async fn build_cache_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.cache_backend() {
        CacheBackendKind::S3 { bucket } => {
            let client = build_s3(&bucket, config.credentials.aws.as_ref())
                .with_context(|| format!("failed to create S3 cache client for bucket {bucket}"))?;
            info!(bucket = %bucket, "using S3 rendition cache");
            Arc::new(ObjectCacheStore::new(client, ObjectBackend::S3))
        }
        CacheBackendKind::Azure { container } => {
            let client = build_azure(&container, config.credentials.azure.as_ref())
                .with_context(|| {
                    format!("failed to create Azure cache client for container {container}")
                })?;
            info!(container = %container, "using Azure rendition cache");
            Arc::new(ObjectCacheStore::new(client, ObjectBackend::Azure))
        }
        CacheBackendKind::Filesystem { root } => {
            let store = FsCacheStore::new(&root);
            store
                .ensure_root()
                .await
                .with_context(|| format!("failed to create cache directory {root}"))?;
            info!(root = %root, "using filesystem rendition cache");
            Arc::new(store)
        }
    };
    Ok(store)
}
