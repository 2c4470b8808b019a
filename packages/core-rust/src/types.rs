//! Request vocabulary shared by the key resolver and the server: storage
//! kinds, target sizes, crop gravity and quality bounds.

use std::fmt;
use std::str::FromStr;

/// Quality applied when neither the process nor the request overrides it.
pub const DEFAULT_QUALITY: u8 = 80;

/// Where the original image lives.
///
/// Route tokens are `loc`, `rem`, `az` and `s3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// A file on the local filesystem.
    Local,
    /// An object reachable over HTTP; the path starts with the host.
    Remote,
    /// An Azure Blob Storage object; the path starts with the container.
    Azure,
    /// An S3 object; the path starts with the bucket.
    S3,
}

impl StorageKind {
    /// Returns the route token for this storage kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "loc",
            Self::Remote => "rem",
            Self::Azure => "az",
            Self::S3 => "s3",
        }
    }

    /// Whether the first path segment names a host or bucket rather than a
    /// directory.
    #[must_use]
    pub fn has_namespace_segment(self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognised storage token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage kind: {0}")]
pub struct UnknownStorageKind(pub String);

impl FromStr for StorageKind {
    type Err = UnknownStorageKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loc" => Ok(Self::Local),
            "rem" => Ok(Self::Remote),
            "az" => Ok(Self::Azure),
            "s3" => Ok(Self::S3),
            other => Err(UnknownStorageKind(other.to_string())),
        }
    }
}

/// Requested output dimensions. Zero means "unspecified".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parses a `WxH` route token.
    ///
    /// Either side may be empty or non-numeric, in which case it counts as
    /// zero. A token without an `x` yields `0x0`.
    #[must_use]
    pub fn parse_lenient(token: &str) -> Self {
        let Some((w, h)) = token.split_once('x') else {
            return Self::default();
        };
        Self {
            width: w.parse().unwrap_or(0),
            height: h.parse().unwrap_or(0),
        }
    }

    /// True when neither dimension is given (no resize).
    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

bitflags::bitflags! {
    /// Edges a crop is anchored to. The empty set means centre.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Gravity: u8 {
        const TOP = 1;
        const RIGHT = 1 << 1;
        const BOTTOM = 1 << 2;
        const LEFT = 1 << 3;
    }
}

impl Gravity {
    pub const CENTRE: Self = Self::empty();

    /// Parses a comma separated `crop` parameter such as `left,top`.
    ///
    /// Unknown names are ignored.
    #[must_use]
    pub fn parse_crop(value: &str) -> Self {
        value
            .split(',')
            .filter_map(|name| match name.trim() {
                "top" => Some(Self::TOP),
                "right" => Some(Self::RIGHT),
                "bottom" => Some(Self::BOTTOM),
                "left" => Some(Self::LEFT),
                _ => None,
            })
            .fold(Self::CENTRE, |acc, g| acc | g)
    }
}

/// Clamps a quality value into `1..=100`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_quality(value: i64) -> u8 {
    value.clamp(1, 100) as u8
}
