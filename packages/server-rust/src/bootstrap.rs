//! Turns validated configuration into a ready-to-start server.

use std::sync::Arc;

use tracing::info;

use crate::network::{AppState, NetworkConfig, NetworkModule};
use crate::service::config::ServerConfig;
use crate::service::pipeline::RequestPipeline;
use crate::storage::build_cache_store;
use crate::transform::ImageTransformer;

/// Builds the cache, pipeline, shared state and network module.
///
/// # Errors
///
/// Fails if the cache backend cannot be initialised, the outbound HTTP
/// client cannot be built, or the image URL pattern does not compile.
pub async fn build_server(
    network: NetworkConfig,
    config: ServerConfig,
) -> anyhow::Result<NetworkModule> {
    let image_route = config.url_pattern()?;
    let cache = build_cache_store(&config).await?;
    let pipeline = RequestPipeline::from_config(&config, cache, Arc::new(ImageTransformer))?;

    info!(
        mark = %config.mark,
        cache = pipeline.cache().backend(),
        peers = config.nodes.len(),
        pool_size = config.pool_size,
        "pipeline ready"
    );

    let state = AppState::new(Arc::new(config), Arc::new(pipeline));
    Ok(NetworkModule::new(network, state, image_route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_with_filesystem_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            cache_dir: dir.path().join("cache").to_string_lossy().into_owned(),
            ..ServerConfig::default()
        };
        let mut module = build_server(NetworkConfig::default(), config).await.unwrap();
        assert!(module.start().await.unwrap() > 0);
        assert!(dir.path().join("cache").is_dir());
    }
}
