//! The per-request image pipeline.
//!
//! ```text
//! cache ──hit──────────────────────────────────────────────▶ serve
//!   │ miss
//! peers ──hit──────────────────────────────────────────────▶ serve
//!   │ miss
//! origin (or default image) ──▶ transform ──▶ cache write ──▶ serve
//! ```
//!
//! Cache-only requests from sibling nodes stop after the first step.
//! Bypass requests skip the first two.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use rendition_core::{RequestContext, Transformer};
use tracing::{debug, warn};

use crate::cluster::{PeerError, PeerFallback};
use crate::origin::{OriginFetcher, RemoteOrigin};
use crate::service::admission::AdmissionPermit;
use crate::service::config::ServerConfig;
use crate::storage::CacheStore;
use crate::telemetry::{CACHE_HIT, CACHE_MISS, PEER_HIT, TRANSFORM_FAILURE};
use crate::transform::is_resizable;

/// Where the served bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenditionSource {
    Cache,
    Peer,
    /// Origin bytes served unchanged: original requested, not resizable,
    /// or the transform failed.
    Origin,
    Transformed,
}

impl RenditionSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Peer => "peer",
            Self::Origin => "origin",
            Self::Transformed => "transformed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Served { bytes: Bytes, source: RenditionSource },
    NotFound,
}

pub struct RequestPipeline {
    cache: Arc<dyn CacheStore>,
    origins: OriginFetcher,
    peers: PeerFallback,
    transformer: Arc<dyn Transformer>,
}

impl RequestPipeline {
    #[must_use]
    pub fn new(
        cache: Arc<dyn CacheStore>,
        origins: OriginFetcher,
        peers: PeerFallback,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            cache,
            origins,
            peers,
            transformer,
        }
    }

    /// Wires origins and peers from `config` around an existing cache.
    ///
    /// # Errors
    ///
    /// Fails if the outbound HTTP client cannot be built.
    pub fn from_config(
        config: &ServerConfig,
        cache: Arc<dyn CacheStore>,
        transformer: Arc<dyn Transformer>,
    ) -> anyhow::Result<Self> {
        let remote = RemoteOrigin::new(config.scheme.clone(), config.origin_timeout)?;
        Ok(Self::new(
            cache,
            OriginFetcher::from_config(config, remote.clone()),
            PeerFallback::new(config.nodes.clone(), remote),
            transformer,
        ))
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    #[must_use]
    pub fn origins(&self) -> &OriginFetcher {
        &self.origins
    }

    #[must_use]
    pub fn peers(&self) -> &PeerFallback {
        &self.peers
    }

    pub async fn run(&self, ctx: &RequestContext) -> PipelineOutcome {
        self.run_admitted(ctx, None).await
    }

    /// Like [`run`](Self::run), but a transform started here keeps `permit`
    /// until it returns, even if this future is dropped first.
    pub async fn run_admitted(
        &self,
        ctx: &RequestContext,
        permit: Option<AdmissionPermit>,
    ) -> PipelineOutcome {
        if ctx.peer_only() {
            return match self.cached(ctx).await {
                Some(bytes) => PipelineOutcome::Served {
                    bytes,
                    source: RenditionSource::Cache,
                },
                None => PipelineOutcome::NotFound,
            };
        }

        if !ctx.bypass_cache() {
            if let Some(bytes) = self.cached(ctx).await {
                return PipelineOutcome::Served {
                    bytes,
                    source: RenditionSource::Cache,
                };
            }
            match self.peers.query(ctx).await {
                Ok(bytes) => {
                    counter!(PEER_HIT).increment(1);
                    return PipelineOutcome::Served {
                        bytes,
                        source: RenditionSource::Peer,
                    };
                }
                Err(PeerError::NoPeers | PeerError::PeerOnly) => {}
                Err(err) => debug!(error = %err, "peer fallback missed"),
            }
        }

        let original = match self.origins.fetch_or_default(ctx).await {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(error = %err, "no original to serve");
                return PipelineOutcome::NotFound;
            }
        };

        let (bytes, source) = self.render(ctx, original, permit).await;
        if let Err(err) = self.cache.set(ctx.cache_key(), bytes.clone()).await {
            warn!(
                key = ctx.cache_key(),
                backend = self.cache.backend(),
                error = %err,
                "cache write failed"
            );
        }

        PipelineOutcome::Served { bytes, source }
    }

    async fn cached(&self, ctx: &RequestContext) -> Option<Bytes> {
        match self.cache.get(ctx.cache_key()).await {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                counter!(CACHE_HIT).increment(1);
                Some(bytes)
            }
            Ok(_) => {
                counter!(CACHE_MISS).increment(1);
                None
            }
            Err(err) => {
                counter!(CACHE_MISS).increment(1);
                warn!(key = ctx.cache_key(), error = %err, "cache read failed");
                None
            }
        }
    }

    /// Transforms `original` on a blocking thread, falling back to the
    /// original bytes when the transform fails or panics.
    async fn render(
        &self,
        ctx: &RequestContext,
        original: Bytes,
        permit: Option<AdmissionPermit>,
    ) -> (Bytes, RenditionSource) {
        if ctx.original_requested() || !is_resizable(&original) {
            return (original, RenditionSource::Origin);
        }

        let transformer = Arc::clone(&self.transformer);
        let options = ctx.transform_options();
        let input = original.clone();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            transformer.transform(&input, &options)
        })
        .await;

        let failure = match result {
            Ok(Ok(out)) if !out.is_empty() => {
                return (Bytes::from(out), RenditionSource::Transformed)
            }
            Ok(Ok(_)) => "transform produced no output".to_string(),
            Ok(Err(err)) => err.to_string(),
            Err(join_err) => join_err.to_string(),
        };
        counter!(TRANSFORM_FAILURE).increment(1);
        warn!(
            path = ctx.origin_path(),
            size = %ctx.size(),
            error = %failure,
            "transform failed, serving original"
        );
        (original, RenditionSource::Origin)
    }
}
