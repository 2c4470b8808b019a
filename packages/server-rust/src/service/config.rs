use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use rendition_core::{KeyLayout, DEFAULT_QUALITY};

/// Default admission gate capacity.
pub const DEFAULT_POOL_SIZE: usize = 100_000;

/// Process-wide settings for the image pipeline.
///
/// Built once at startup and shared behind an `Arc`; never mutated while
/// serving.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Scheme used for remote origins and peer nodes.
    pub scheme: String,
    /// First path segment of image URLs (e.g. `images`).
    pub mark: String,
    /// Allowed `WxH` tokens. Empty allows any size.
    pub allowed_sizes: Vec<String>,
    /// Allowed path prefixes (media hosts). Empty allows any path.
    pub allowed_media: Vec<String>,
    /// Root directory of the filesystem cache.
    pub cache_dir: String,
    /// S3 bucket used as the rendition cache.
    pub s3_bucket: Option<String>,
    /// Azure container used as the rendition cache.
    pub azure_container: Option<String>,
    /// Image served when an origin has nothing.
    pub default_image: Option<PathBuf>,
    /// Directories searched in order for local originals.
    pub search_dirs: Vec<PathBuf>,
    /// Secret that `X-No-Cache` must match to bypass the cache.
    pub no_cache_key: Option<String>,
    /// Sibling nodes (`host:port`) asked before recomputing.
    pub nodes: Vec<String>,
    pub default_quality: u8,
    /// Capacity of the admission gate.
    pub pool_size: usize,
    /// Timeout applied to every outbound origin and peer request.
    pub origin_timeout: Duration,
    pub credentials: ObjectCredentials,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            mark: "images".to_string(),
            allowed_sizes: Vec::new(),
            allowed_media: Vec::new(),
            cache_dir: "/tmp/imgwizard".to_string(),
            s3_bucket: None,
            azure_container: None,
            default_image: None,
            search_dirs: Vec::new(),
            no_cache_key: None,
            nodes: Vec::new(),
            default_quality: DEFAULT_QUALITY,
            pool_size: DEFAULT_POOL_SIZE,
            origin_timeout: Duration::from_secs(30),
            credentials: ObjectCredentials::default(),
        }
    }
}

/// Which backend holds cached renditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendKind {
    Filesystem { root: String },
    S3 { bucket: String },
    Azure { container: String },
}

impl ServerConfig {
    /// Picks the cache backend. S3 wins over Azure; the filesystem is the
    /// fallback.
    #[must_use]
    pub fn cache_backend(&self) -> CacheBackendKind {
        if let Some(bucket) = self.s3_bucket.as_ref().filter(|b| !b.is_empty()) {
            return CacheBackendKind::S3 {
                bucket: bucket.clone(),
            };
        }
        if let Some(container) = self.azure_container.as_ref().filter(|c| !c.is_empty()) {
            return CacheBackendKind::Azure {
                container: container.clone(),
            };
        }
        CacheBackendKind::Filesystem {
            root: self.cache_dir.clone(),
        }
    }

    /// Key layout matching the active cache backend.
    #[must_use]
    pub fn key_layout(&self) -> KeyLayout {
        match self.cache_backend() {
            CacheBackendKind::Filesystem { root } => KeyLayout::filesystem(root),
            CacheBackendKind::S3 { .. } | CacheBackendKind::Azure { .. } => {
                KeyLayout::object_storage()
            }
        }
    }

    /// Compiles the image URL pattern.
    ///
    /// Captures `mark`, `storage`, `size` and `path`. Mark, sizes and media
    /// prefixes are matched literally.
    ///
    /// # Errors
    ///
    /// Returns an error if the assembled pattern does not compile.
    pub fn url_pattern(&self) -> Result<Regex, regex::Error> {
        let sizes = if self.allowed_sizes.is_empty() {
            "[0-9]*x[0-9]*".to_string()
        } else {
            alternation(&self.allowed_sizes)
        };
        let media = alternation(&self.allowed_media);

        Regex::new(&format!(
            "^/(?P<mark>{})/(?P<storage>loc|rem|az|s3)/(?P<size>{sizes})/(?P<path>(?:{media}).+)$",
            regex::escape(&self.mark),
        ))
    }
}

fn alternation(items: &[String]) -> String {
    items
        .iter()
        .map(|item| regex::escape(item))
        .collect::<Vec<_>>()
        .join("|")
}

/// Object storage credentials loaded once from the environment.
#[derive(Clone, Default)]
pub struct ObjectCredentials {
    pub aws: Option<AwsCredentials>,
    pub azure: Option<AzureCredentials>,
}

#[derive(Clone)]
pub struct AwsCredentials {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Clone)]
pub struct AzureCredentials {
    pub account: String,
    pub access_key: String,
}

impl fmt::Debug for ObjectCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCredentials")
            .field("aws", &self.aws.as_ref().map(|c| &c.region))
            .field("azure", &self.azure.as_ref().map(|c| &c.account))
            .finish()
    }
}
