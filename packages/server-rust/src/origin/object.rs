//! Originals stored in S3 buckets or Azure containers.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use object_store::path::Path;
use object_store::ObjectStore;
use rendition_core::StorageKind;

use super::FetchError;
use crate::service::config::ObjectCredentials;
use crate::storage::backends::{build_azure, build_s3};

/// Object-store clients keyed by storage kind and bucket.
///
/// Clients are built on first use and reused afterwards. Building one needs
/// credentials for that kind.
pub struct ObjectOrigins {
    credentials: ObjectCredentials,
    clients: DashMap<(StorageKind, String), Arc<dyn ObjectStore>>,
}

impl ObjectOrigins {
    #[must_use]
    pub fn new(credentials: ObjectCredentials) -> Self {
        Self {
            credentials,
            clients: DashMap::new(),
        }
    }

    /// Registers a ready-made client for `bucket`.
    pub fn insert(&self, kind: StorageKind, bucket: &str, store: Arc<dyn ObjectStore>) {
        self.clients.insert((kind, bucket.to_string()), store);
    }

    /// Downloads `object` from `bucket`.
    ///
    /// # Errors
    ///
    /// [`FetchError::Unconfigured`] without credentials for `kind`,
    /// [`FetchError::NotFound`] for a missing object, and
    /// [`FetchError::ObjectStore`] for anything else the service reports.
    pub async fn fetch(
        &self,
        kind: StorageKind,
        bucket: &str,
        object: &str,
    ) -> Result<Bytes, FetchError> {
        let client = self.client(kind, bucket)?;
        match client.get(&Path::from(object)).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => Err(FetchError::NotFound {
                path: format!("{bucket}/{object}"),
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn client(&self, kind: StorageKind, bucket: &str) -> Result<Arc<dyn ObjectStore>, FetchError> {
        let key = (kind, bucket.to_string());
        if let Some(client) = self.clients.get(&key) {
            return Ok(Arc::clone(client.value()));
        }

        let client = match kind {
            StorageKind::S3 => {
                let creds = self
                    .credentials
                    .aws
                    .as_ref()
                    .ok_or(FetchError::Unconfigured { kind })?;
                build_s3(bucket, Some(creds))?
            }
            StorageKind::Azure => {
                let creds = self
                    .credentials
                    .azure
                    .as_ref()
                    .ok_or(FetchError::Unconfigured { kind })?;
                build_azure(bucket, Some(creds))?
            }
            StorageKind::Local | StorageKind::Remote => {
                return Err(FetchError::Unconfigured { kind })
            }
        };

        tracing::debug!(%kind, bucket, "created object storage client");
        Ok(Arc::clone(self.clients.entry(key).or_insert(client).value()))
    }
}
