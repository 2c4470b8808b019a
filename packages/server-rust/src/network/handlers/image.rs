//! The image endpoint.
//!
//! Reached through the route table, which has already matched the image
//! URL pattern and stored its captures as a [`RouteMatch`].

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use metrics::{counter, histogram};
use rendition_core::{clamp_quality, Gravity, ImageRequest, RequestContext, Size, StorageKind};
use subtle::ConstantTimeEq;
use tracing::field::Empty;
use tracing::{info_span, Instrument};

use super::AppState;
use crate::cluster::{CACHE_DESTINATION_HEADER, CACHE_ONLY_HEADER};
use crate::service::admission::AdmissionPermit;
use crate::service::config::ServerConfig;
use crate::service::pipeline::PipelineOutcome;
use crate::service::router::RouteMatch;
use crate::telemetry::{NOT_FOUND, REQUEST_DURATION};
use crate::transform::content_type;

/// Carries the bypass secret.
pub const NO_CACHE_HEADER: &str = "x-no-cache";

/// Recognised query parameters. Anything else is ignored; a repeated
/// parameter keeps its first value.
#[derive(Debug, Default)]
struct ImageQuery {
    q: Option<String>,
    crop: Option<String>,
    original: Option<String>,
}

impl ImageQuery {
    fn from_uri(uri: &Uri) -> Self {
        let pairs = Query::<Vec<(String, String)>>::try_from_uri(uri)
            .map(|Query(pairs)| pairs)
            .unwrap_or_default();
        let mut query = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "q" => &mut query.q,
                "crop" => &mut query.crop,
                "original" => &mut query.original,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
        query
    }
}

pub async fn image_handler(
    State(state): State<AppState>,
    Extension(route): Extension<RouteMatch>,
    permit: Option<Extension<AdmissionPermit>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let _in_flight = state.shutdown.in_flight_guard();

    let Some(request) = build_request(&route, &uri, &headers, &state.config) else {
        counter!(NOT_FOUND).increment(1);
        return StatusCode::NOT_FOUND.into_response();
    };
    let ctx = RequestContext::new(request, &state.key_layout);

    let span = info_span!(
        "image",
        storage = %ctx.storage_kind(),
        size = %ctx.size(),
        key = ctx.cache_key(),
        source = Empty,
        duration_ms = Empty,
    );
    let started = Instant::now();
    let permit = permit.map(|Extension(permit)| permit);
    let outcome = state
        .pipeline
        .run_admitted(&ctx, permit)
        .instrument(span.clone())
        .await;
    let elapsed = started.elapsed();

    let label = match &outcome {
        PipelineOutcome::Served { source, .. } => source.as_str(),
        PipelineOutcome::NotFound => "not_found",
    };
    span.record("source", label);
    span.record("duration_ms", u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    histogram!(REQUEST_DURATION, "source" => label).record(elapsed.as_secs_f64());

    match outcome {
        PipelineOutcome::Served { bytes, .. } => (
            [
                (CONTENT_TYPE, HeaderValue::from_static(content_type(&bytes))),
                (CONTENT_LENGTH, HeaderValue::from(bytes.len())),
            ],
            bytes,
        )
            .into_response(),
        PipelineOutcome::NotFound => {
            counter!(NOT_FOUND).increment(1);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Assembles an [`ImageRequest`] from route captures, query and headers.
///
/// Returns `None` if the captures are incomplete.
fn build_request(
    route: &RouteMatch,
    uri: &Uri,
    headers: &HeaderMap,
    config: &ServerConfig,
) -> Option<ImageRequest> {
    let storage: StorageKind = route.get("storage")?.parse().ok()?;
    let size = Size::parse_lenient(route.get("size")?);
    let path = route.get("path")?;
    let mark = route.get("mark").unwrap_or(config.mark.as_str());
    let query = ImageQuery::from_uri(uri);

    let mut request = ImageRequest::new(mark, storage, path, size);
    request.quality = query
        .q
        .as_deref()
        .and_then(|q| q.trim().parse::<i64>().ok())
        .map_or(config.default_quality, clamp_quality);
    request.gravity = query
        .crop
        .as_deref()
        .map_or(Gravity::CENTRE, Gravity::parse_crop);
    request.original_requested = query.original.is_some_and(|o| !o.is_empty());
    request.wants_webp = accepts_webp(headers);
    request.bypass_cache = bypass_granted(headers, config.no_cache_key.as_deref());
    request.peer_only = header_text(headers, CACHE_ONLY_HEADER).is_some();
    request.cache_destination = header_text(headers, CACHE_DESTINATION_HEADER);
    request.query = uri.query().unwrap_or_default().to_string();
    request.request_uri = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    Some(request)
}

/// True if any `Accept` entry names `image/webp`.
fn accepts_webp(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|entry| entry.split(';').next().unwrap_or_default().trim())
        .any(|media| media.eq_ignore_ascii_case("image/webp"))
}

/// Constant-time comparison of `X-No-Cache` against the configured secret.
fn bypass_granted(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let (Some(secret), Some(offered)) = (secret, headers.get(NO_CACHE_HEADER)) else {
        return false;
    };
    !secret.is_empty() && bool::from(offered.as_bytes().ct_eq(secret.as_bytes()))
}

/// Non-empty header value, decoded lossily so UTF-8 keys survive.
fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    let text = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
    (!text.is_empty()).then_some(text)
}
