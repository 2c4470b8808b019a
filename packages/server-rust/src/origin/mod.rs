//! Fetching original images.
//!
//! [`OriginFetcher`] dispatches on the request's storage kind: local
//! search directories, plain HTTP, or an object store whose bucket is the
//! first path segment. A configured default image stands in when the
//! original is unavailable.

mod local;
mod object;
mod remote;

use std::path::PathBuf;

use bytes::Bytes;
use metrics::counter;
use rendition_core::{RequestContext, StorageKind};
use tracing::warn;

pub use local::{read_file, LocalOrigin};
pub use object::ObjectOrigins;
pub use remote::{PeerQuery, RemoteOrigin};

use crate::service::config::ServerConfig;
use crate::telemetry::ORIGIN_FAILURE;

/// Why an original could not be fetched.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("original not found: {path}")]
    NotFound { path: String },
    #[error("{url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid origin url {url:?}")]
    InvalidUrl { url: String },
    #[error("reading {path} failed: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("object storage: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("no credentials configured for {kind} originals")]
    Unconfigured { kind: StorageKind },
}

pub struct OriginFetcher {
    local: LocalOrigin,
    remote: RemoteOrigin,
    objects: ObjectOrigins,
    default_image: Option<PathBuf>,
}

impl OriginFetcher {
    #[must_use]
    pub fn new(
        local: LocalOrigin,
        remote: RemoteOrigin,
        objects: ObjectOrigins,
        default_image: Option<PathBuf>,
    ) -> Self {
        Self {
            local,
            remote,
            objects,
            default_image,
        }
    }

    /// Wires the fetchers from process configuration, sharing `remote`.
    #[must_use]
    pub fn from_config(config: &ServerConfig, remote: RemoteOrigin) -> Self {
        Self::new(
            LocalOrigin::new(config.search_dirs.clone()),
            remote,
            ObjectOrigins::new(config.credentials.clone()),
            config.default_image.clone(),
        )
    }

    #[must_use]
    pub fn objects(&self) -> &ObjectOrigins {
        &self.objects
    }

    /// Fetches the original for `ctx`.
    ///
    /// # Errors
    ///
    /// Any [`FetchError`] raised by the selected origin.
    pub async fn fetch(&self, ctx: &RequestContext) -> Result<Bytes, FetchError> {
        match ctx.storage_kind() {
            StorageKind::Local => self.local.fetch(ctx.origin_path()).await,
            StorageKind::Remote => {
                let url = self.remote.url_for(ctx.origin_path());
                self.remote.get(&url, None).await
            }
            kind @ (StorageKind::S3 | StorageKind::Azure) => {
                let (bucket, object) =
                    ctx.bucket_and_object()
                        .ok_or_else(|| FetchError::NotFound {
                            path: ctx.origin_path().to_string(),
                        })?;
                self.objects.fetch(kind, bucket, object).await
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but falls back to the default image.
    ///
    /// An empty original counts as a failure.
    ///
    /// # Errors
    ///
    /// The original error, when there is no default image or it cannot be
    /// read either.
    pub async fn fetch_or_default(&self, ctx: &RequestContext) -> Result<Bytes, FetchError> {
        let err = match self.fetch(ctx).await {
            Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
            Ok(_) => FetchError::NotFound {
                path: ctx.origin_path().to_string(),
            },
            Err(err) => err,
        };

        counter!(ORIGIN_FAILURE, "storage" => ctx.storage_kind().as_str()).increment(1);
        warn!(
            storage = %ctx.storage_kind(),
            path = ctx.origin_path(),
            error = %err,
            "original unavailable"
        );

        let Some(default_image) = &self.default_image else {
            return Err(err);
        };
        match read_file(default_image).await {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            Ok(_) => Err(err),
            Err(default_err) => {
                warn!(
                    path = %default_image.display(),
                    error = %default_err,
                    "default image unavailable"
                );
                Err(err)
            }
        }
    }
}
