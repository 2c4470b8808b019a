//! `rendition` core: request context, cache key derivation and the image
//! transform contract.

pub mod context;
pub mod key;
pub mod traits;
pub mod types;

pub use context::{ImageRequest, RequestContext};
pub use key::{decode_path, KeyInput, KeyLayout};
pub use traits::{TransformError, TransformOptions, Transformer};
pub use types::{clamp_quality, Gravity, Size, StorageKind, DEFAULT_QUALITY};
