use crate::types::{Gravity, DEFAULT_QUALITY};

/// Parameters for a single transform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Target width; 0 derives it from the height and aspect ratio.
    pub width: u32,
    /// Target height; 0 derives it from the width and aspect ratio.
    pub height: u32,
    pub quality: u8,
    pub gravity: Gravity,
    /// Encode the output as WebP regardless of the input format.
    pub webp: bool,
    /// Fill the target box exactly, cropping the overflow at `gravity`.
    pub crop: bool,
    /// Allow output larger than the source.
    pub enlarge: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            quality: DEFAULT_QUALITY,
            gravity: Gravity::CENTRE,
            webp: false,
            crop: true,
            enlarge: false,
        }
    }
}

/// Failure reported by a [`Transformer`].
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("unsupported input format")]
    Unsupported,
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// The external image transform capability.
///
/// Synchronous and CPU bound; async callers should run it on a blocking
/// thread. Implementations must be deterministic for a given input so that
/// concurrent writers of the same cache key produce identical bytes.
pub trait Transformer: Send + Sync + 'static {
    /// Produces the rendition of `input` described by `options`.
    fn transform(&self, input: &[u8], options: &TransformOptions) -> Result<Vec<u8>, TransformError>;
}
