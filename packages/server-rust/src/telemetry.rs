//! Tracing subscriber and metrics installation for the binary.

use std::net::SocketAddr;
use std::sync::Once;

use clap::ValueEnum;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const CACHE_HIT: &str = "rendition_cache_hit_total";
pub const CACHE_MISS: &str = "rendition_cache_miss_total";
pub const PEER_HIT: &str = "rendition_peer_hit_total";
pub const ORIGIN_FAILURE: &str = "rendition_origin_failure_total";
pub const TRANSFORM_FAILURE: &str = "rendition_transform_failure_total";
pub const NOT_FOUND: &str = "rendition_not_found_total";
pub const REQUEST_DURATION: &str = "rendition_request_duration_seconds";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

/// Installs the Prometheus exporter on `addr` and registers metric
/// descriptions.
///
/// # Errors
///
/// Fails if the listener cannot be bound or a recorder is already installed.
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| anyhow::anyhow!("failed to install metrics exporter: {err}"))?;
    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(CACHE_HIT, Unit::Count, "Renditions served from the local cache.");
        describe_counter!(CACHE_MISS, Unit::Count, "Local cache lookups that found nothing.");
        describe_counter!(PEER_HIT, Unit::Count, "Renditions served by a sibling node.");
        describe_counter!(
            ORIGIN_FAILURE,
            Unit::Count,
            "Origin fetches that failed, before default-image fallback."
        );
        describe_counter!(
            TRANSFORM_FAILURE,
            Unit::Count,
            "Transforms that failed and fell back to the original bytes."
        );
        describe_counter!(NOT_FOUND, Unit::Count, "Requests answered with 404.");
        describe_histogram!(
            REQUEST_DURATION,
            Unit::Seconds,
            "Image pipeline time per request, labelled by where the bytes came from."
        );
    });
}
