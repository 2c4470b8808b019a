//! `rendition` server: an HTTP image resizing proxy with a shared
//! rendition cache and sibling-node fallback.

pub mod bootstrap;
pub mod cli;
pub mod cluster;
pub mod network;
pub mod origin;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod transform;

pub use bootstrap::build_server;
pub use cli::{Cli, ConfigError};
pub use network::{build_router, AppState, NetworkConfig, NetworkModule};
pub use service::config::ServerConfig;
pub use service::pipeline::{PipelineOutcome, RenditionSource, RequestPipeline};
pub use storage::CacheStore;
