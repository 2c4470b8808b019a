//! Concrete [`CacheStore`](super::CacheStore) implementations.

pub mod filesystem;
pub mod object;

pub use filesystem::FsCacheStore;
pub use object::{build_azure, build_s3, ObjectBackend, ObjectCacheStore};
