//! Server lifecycle: `new()` wires state, `start()` binds, `serve()` runs
//! until shutdown and then drains.

use std::future::Future;
use std::sync::Arc;
use axum::handler::Handler;
use axum::routing::get;
use axum::Router;
use regex::Regex;
use tokio::net::TcpListener;
use tower::Layer;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, image_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::router::RouteTable;

/// Health routes plus the image route table, under the shared middleware.
///
/// Image requests pass through the admission gate; health checks do not.
pub fn build_router(config: &NetworkConfig, state: AppState, image_route: Regex) -> Router {
    let images = state.gate.layer().layer(image_handler.with_state(state.clone()));
    let table = RouteTable::new().route(image_route, images);

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .fallback_service(table)
        .layer(build_http_layers(config))
        .with_state(state)
}

pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    state: AppState,
    image_route: Regex,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, state: AppState, image_route: Regex) -> Self {
        Self {
            config,
            listener: None,
            state,
            image_route,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.state.shutdown)
    }

    #[must_use]
    pub fn build_router(&self) -> Router {
        build_router(&self.config, self.state.clone(), self.image_route.clone())
    }

    /// Binds the listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let port = listener.local_addr()?.port();
        info!(requested = %self.config.listen_addr(), port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves or the controller is triggered,
    /// then waits up to `drain_timeout` for in-flight image requests.
    ///
    /// # Errors
    ///
    /// Fails if `start()` was not called first or the server hits a fatal
    /// I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let controller = self.state.shutdown;

        controller.set_ready();
        info!(addr = %listener.local_addr()?, "serving image requests");

        let signal = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    () = shutdown => {}
                    () = signal.shutdown_requested() => {}
                }
                signal.trigger_shutdown();
                info!("shutdown requested, draining");
            })
            .await?;

        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timed out with requests still running"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::test_support::state_in;
    use crate::network::HealthState;

    fn module(dir: &std::path::Path) -> NetworkModule {
        let state = state_in(dir, |_| {});
        let pattern = state.config.url_pattern().unwrap();
        NetworkModule::new(NetworkConfig::default(), state, pattern)
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port() {
        let dir = tempfile::tempdir().unwrap();
        let mut module = module(dir.path());
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = module(dir.path())
            .serve(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serves_until_controller_triggers_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut module = module(dir.path());
        let port = module.start().await.unwrap();
        let controller = module.shutdown_controller();

        let server = tokio::spawn(module.serve(std::future::pending::<()>()));

        let client = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{port}/health/ready");
        let mut status = None;
        for _ in 0..50 {
            if let Ok(resp) = client.get(&url).send().await {
                status = Some(resp.status());
                if resp.status() == reqwest::StatusCode::OK {
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(reqwest::StatusCode::OK));
        drop(client);

        controller.trigger_shutdown();
        server.await.unwrap().unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
