use crate::key::{decode_path, KeyInput, KeyLayout};
use crate::traits::TransformOptions;
use crate::types::{Gravity, Size, StorageKind, DEFAULT_QUALITY};

/// Raw, already-validated pieces of an inbound image request.
///
/// Produced by the HTTP layer from route captures, headers and query
/// parameters, then frozen into a [`RequestContext`].
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub storage: StorageKind,
    /// Origin path exactly as it appeared in the URL (may be percent-encoded).
    pub raw_path: String,
    pub size: Size,
    pub quality: u8,
    pub gravity: Gravity,
    pub wants_webp: bool,
    pub bypass_cache: bool,
    pub peer_only: bool,
    pub original_requested: bool,
    /// Key supplied by a peer via `X-Cache-Destination`.
    pub cache_destination: Option<String>,
    /// Raw query string without the leading `?`.
    pub query: String,
    /// Path and query as received, used to address the same resource on peers.
    pub request_uri: String,
}

impl ImageRequest {
    /// A plain request with default quality and no flags set. `request_uri`
    /// is rebuilt from `mark` and the other parts, without a query.
    #[must_use]
    pub fn new(mark: &str, storage: StorageKind, raw_path: impl Into<String>, size: Size) -> Self {
        let raw_path = raw_path.into();
        let request_uri = format!("/{mark}/{}/{size}/{raw_path}", storage.as_str());
        Self {
            storage,
            raw_path,
            size,
            quality: DEFAULT_QUALITY,
            gravity: Gravity::CENTRE,
            wants_webp: false,
            bypass_cache: false,
            peer_only: false,
            original_requested: false,
            cache_destination: None,
            query: String::new(),
            request_uri,
        }
    }
}

/// Per-request context, immutable once built.
///
/// The cache key is derived exactly once, in [`RequestContext::new`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    storage: StorageKind,
    origin_path: String,
    size: Size,
    quality: u8,
    gravity: Gravity,
    wants_webp: bool,
    bypass_cache: bool,
    peer_only: bool,
    original_requested: bool,
    query: String,
    request_uri: String,
    cache_key: String,
}

impl RequestContext {
    /// Freezes a request and derives its cache key.
    ///
    /// A peer-supplied destination replaces the derived key only for
    /// peer-only requests and only when `layout` accepts it.
    #[must_use]
    pub fn new(request: ImageRequest, layout: &KeyLayout) -> Self {
        let origin_path = decode_path(&request.raw_path);

        let destination = request
            .cache_destination
            .filter(|dest| request.peer_only && layout.accepts_override(dest));

        let cache_key = destination.unwrap_or_else(|| {
            layout.resolve(&KeyInput {
                storage: request.storage,
                origin_path: &origin_path,
                size: request.size,
                webp: request.wants_webp,
                query: &request.query,
            })
        });

        Self {
            storage: request.storage,
            origin_path,
            size: request.size,
            quality: request.quality,
            gravity: request.gravity,
            wants_webp: request.wants_webp,
            bypass_cache: request.bypass_cache,
            peer_only: request.peer_only,
            original_requested: request.original_requested,
            query: request.query,
            request_uri: request.request_uri,
            cache_key,
        }
    }

    #[must_use]
    pub fn storage_kind(&self) -> StorageKind {
        self.storage
    }

    /// Percent-decoded origin path.
    #[must_use]
    pub fn origin_path(&self) -> &str {
        &self.origin_path
    }

    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    #[must_use]
    pub fn quality(&self) -> u8 {
        self.quality
    }

    #[must_use]
    pub fn gravity(&self) -> Gravity {
        self.gravity
    }

    #[must_use]
    pub fn wants_webp(&self) -> bool {
        self.wants_webp
    }

    #[must_use]
    pub fn bypass_cache(&self) -> bool {
        self.bypass_cache
    }

    /// True when this request is a sibling node asking for a cached copy.
    /// Such requests must never trigger peer queries of their own.
    #[must_use]
    pub fn peer_only(&self) -> bool {
        self.peer_only
    }

    #[must_use]
    pub fn original_requested(&self) -> bool {
        self.original_requested
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Splits an object-storage path into `(bucket, object)`.
    ///
    /// Returns `None` for non-object kinds or when either part is empty.
    #[must_use]
    pub fn bucket_and_object(&self) -> Option<(&str, &str)> {
        if !matches!(self.storage, StorageKind::S3 | StorageKind::Azure) {
            return None;
        }
        let (bucket, object) = self.origin_path.split_once('/')?;
        let object = object.trim_start_matches('/');
        (!bucket.is_empty() && !object.is_empty()).then_some((bucket, object))
    }

    /// Options handed to the transform capability.
    #[must_use]
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            width: self.size.width,
            height: self.size.height,
            quality: self.quality,
            gravity: self.gravity,
            webp: self.wants_webp,
            ..TransformOptions::default()
        }
    }
}
