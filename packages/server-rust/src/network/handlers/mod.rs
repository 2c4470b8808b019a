//! Axum handlers and the state they share.

pub mod health;
pub mod image;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use image::{image_handler, NO_CACHE_HEADER};

use std::sync::Arc;
use std::time::Instant;

use rendition_core::KeyLayout;

use super::ShutdownController;
use crate::service::admission::AdmissionGate;
use crate::service::config::ServerConfig;
use crate::service::pipeline::RequestPipeline;

/// State carried through axum's `State` extractor. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
    pub config: Arc<ServerConfig>,
    /// Derived from `config` once at startup.
    pub key_layout: Arc<KeyLayout>,
    pub gate: AdmissionGate,
    pub shutdown: Arc<ShutdownController>,
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<ServerConfig>, pipeline: Arc<RequestPipeline>) -> Self {
        Self {
            key_layout: Arc::new(config.key_layout()),
            gate: AdmissionGate::new(config.pool_size),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
            pipeline,
            config,
        }
    }
}
