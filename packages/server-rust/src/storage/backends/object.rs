//! [`CacheStore`] backed by an [`ObjectStore`] (S3 or Azure Blob Storage).
//!
//! Keys are object names relative to the bucket or container.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use crate::service::config::{AwsCredentials, AzureCredentials};
use crate::storage::CacheStore;

/// Which object storage service a store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectBackend {
    S3,
    Azure,
    /// In-process store, used by tests and local experiments.
    Memory,
}

impl ObjectBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Azure => "azure",
            Self::Memory => "memory",
        }
    }
}

/// Builds an S3 client for `bucket`.
///
/// Explicit credentials take precedence over whatever the environment
/// provides.
///
/// # Errors
///
/// Returns an error if the builder rejects the configuration.
pub fn build_s3(
    bucket: &str,
    credentials: Option<&AwsCredentials>,
) -> object_store::Result<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
    if let Some(creds) = credentials {
        builder = builder
            .with_region(&creds.region)
            .with_access_key_id(&creds.access_key_id)
            .with_secret_access_key(&creds.secret_access_key);
    }
    Ok(Arc::new(builder.build()?))
}

/// Builds an Azure Blob Storage client for `container`.
///
/// # Errors
///
/// Returns an error if the builder rejects the configuration (for example,
/// no account name is available).
pub fn build_azure(
    container: &str,
    credentials: Option<&AzureCredentials>,
) -> object_store::Result<Arc<dyn ObjectStore>> {
    let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(container);
    if let Some(creds) = credentials {
        builder = builder
            .with_account(&creds.account)
            .with_access_key(&creds.access_key);
    }
    Ok(Arc::new(builder.build()?))
}

pub struct ObjectCacheStore {
    store: Arc<dyn ObjectStore>,
    backend: ObjectBackend,
}

impl ObjectCacheStore {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, backend: ObjectBackend) -> Self {
        Self { store, backend }
    }
}

#[async_trait]
impl CacheStore for ObjectCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        match self.store.get(&Path::from(key)).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match self.store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> anyhow::Result<()> {
        self.store
            .put(&Path::from(key), PutPayload::from(value))
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        self.backend.as_str()
    }
}
