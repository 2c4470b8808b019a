//! Cache key derivation.
//!
//! A cache key is a slash-delimited path identifying where a rendition is
//! stored. For the filesystem backend it is an absolute file path under the
//! cache root; for object storage it is an object name relative to the
//! bucket or container.
//!
//! Layout: `[root/]<sub path>/<stem>_<w>x<h>[_webp][.<ext>][?<query>]`.
//! Keys are query-sensitive: `?utm=1` and `?utm=2` are distinct entries.

use percent_encoding::percent_decode_str;

use crate::types::{Size, StorageKind};

/// Decodes percent-escapes in a request path.
///
/// Invalid UTF-8 sequences are replaced, so the result is always usable as a
/// key component.
#[must_use]
pub fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Inputs to [`KeyLayout::resolve`].
#[derive(Debug, Clone, Copy)]
pub struct KeyInput<'a> {
    pub storage: StorageKind,
    /// Already percent-decoded origin path.
    pub origin_path: &'a str,
    pub size: Size,
    pub webp: bool,
    /// Raw query string, without the leading `?`. Empty when absent.
    pub query: &'a str,
}

/// Where derived keys are rooted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    cache_root: Option<String>,
}

impl KeyLayout {
    /// Keys rooted at a filesystem cache directory.
    #[must_use]
    pub fn filesystem(root: impl Into<String>) -> Self {
        Self {
            cache_root: Some(root.into()),
        }
    }

    /// Keys relative to an object storage bucket (no root prefix).
    #[must_use]
    pub fn object_storage() -> Self {
        Self { cache_root: None }
    }

    #[must_use]
    pub fn cache_root(&self) -> Option<&str> {
        self.cache_root.as_deref()
    }

    /// Derives the cache key for a request.
    #[must_use]
    pub fn resolve(&self, input: &KeyInput<'_>) -> String {
        let segments: Vec<&str> = input.origin_path.split('/').collect();
        let (file_name, parents) = match segments.split_last() {
            Some((last, parents)) => (*last, parents),
            None => ("", &[][..]),
        };

        let parents = if input.storage.has_namespace_segment() {
            parents.get(1..).unwrap_or_default()
        } else {
            parents
        };

        let mut key = String::with_capacity(input.origin_path.len() + 32);
        if let Some(root) = &self.cache_root {
            key.push_str(root.trim_end_matches('/'));
            key.push('/');
        }
        for segment in parents.iter().filter(|s| !s.is_empty()) {
            key.push_str(segment);
            key.push('/');
        }
        key.push_str(&derived_file_name(file_name, input.size, input.webp));

        if !input.query.is_empty() {
            key.push('?');
            key.push_str(input.query);
        }
        key
    }

    /// Whether a caller-supplied destination may be used as a key verbatim.
    ///
    /// The destination must not climb out of its directory and, when a cache
    /// root is configured, must live under it.
    #[must_use]
    pub fn accepts_override(&self, destination: &str) -> bool {
        if destination.is_empty() || destination.split('/').any(|s| s == "..") {
            return false;
        }
        match &self.cache_root {
            Some(root) => {
                let root = root.trim_end_matches('/');
                destination
                    .strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
            }
            None => true,
        }
    }
}

/// `photo.jpg` at 320x240 becomes `photo_320x240.jpg`.
fn derived_file_name(file_name: &str, size: Size, webp: bool) -> String {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name, None),
    };

    let mut name = format!("{stem}_{size}");
    if webp {
        name.push_str("_webp");
    }
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const LONG_PATH: &str = "media.somesite.ua/uploads/product_image/2015/02/242/c6cc5dd1-6f25-4642-734d-bbf5bef5dffa_orig.jpg";

    fn input<'a>(storage: StorageKind, path: &'a str, w: u32, h: u32) -> KeyInput<'a> {
        KeyInput {
            storage,
            origin_path: path,
            size: Size::new(w, h),
            webp: false,
            query: "",
        }
    }

    #[test]
    fn remote_strips_host_segment() {
        let layout = KeyLayout::filesystem("/tmp/rendition");
        let key = layout.resolve(&input(
            StorageKind::Remote,
            "media.example.com/a/b/img.jpg",
            320,
            240,
        ));
        assert_eq!(key, "/tmp/rendition/a/b/img_320x240.jpg");
    }

    #[test]
    fn local_keeps_first_segment() {
        let layout = KeyLayout::filesystem("/tmp/rendition");
        let key = layout.resolve(&input(
            StorageKind::Local,
            "media.example.com/a/b/img.jpg",
            320,
            240,
        ));
        assert_eq!(key, "/tmp/rendition/media.example.com/a/b/img_320x240.jpg");
    }

    #[test]
    fn object_store_kinds_strip_bucket() {
        let layout = KeyLayout::filesystem("/cache");
        for kind in [StorageKind::S3, StorageKind::Azure] {
            let key = layout.resolve(&input(kind, "bucket/dir/img.png", 10, 20));
            assert_eq!(key, "/cache/dir/img_10x20.png");
        }
    }

    #[test]
    fn long_local_paths_are_preserved() {
        let layout = KeyLayout::filesystem("/your_cache_path");
        let key = layout.resolve(&input(StorageKind::Local, LONG_PATH, 320, 240));
        assert_eq!(
            key,
            "/your_cache_path/media.somesite.ua/uploads/product_image/2015/02/242/c6cc5dd1-6f25-4642-734d-bbf5bef5dffa_orig_320x240.jpg"
        );
    }

    #[test]
    fn zero_dimensions_still_suffix() {
        let layout = KeyLayout::filesystem("/tmp/rendition");
        assert_eq!(
            layout.resolve(&input(StorageKind::Local, "m/e/d/i/a_dir/image_orig.jpg", 0, 0)),
            "/tmp/rendition/m/e/d/i/a_dir/image_orig_0x0.jpg"
        );
        assert_eq!(
            layout.resolve(&input(StorageKind::Remote, "m/e/d/i/a_dir/image_orig.jpg", 0, 240)),
            "/tmp/rendition/e/d/i/a_dir/image_orig_0x240.jpg"
        );
    }

    #[test]
    fn missing_extension_omits_format_suffix() {
        let layout = KeyLayout::filesystem("/tmp/rendition");
        let key = layout.resolve(&input(StorageKind::Local, "media_dir/image_orig", 50, 60));
        assert_eq!(key, "/tmp/rendition/media_dir/image_orig_50x60");
    }

    #[test]
    fn only_last_dot_splits_extension() {
        let layout = KeyLayout::filesystem("/c");
        let key = layout.resolve(&input(StorageKind::Local, "d/archive.tar.gz", 1, 2));
        assert_eq!(key, "/c/d/archive.tar_1x2.gz");
    }

    #[test]
    fn webp_flag_adds_marker_before_extension() {
        let layout = KeyLayout::filesystem("/c");
        let mut req = input(StorageKind::Local, "d/img.png", 5, 5);
        req.webp = true;
        assert_eq!(layout.resolve(&req), "/c/d/img_5x5_webp.png");
    }

    #[test]
    fn query_is_appended_verbatim() {
        let layout = KeyLayout::filesystem("/tmp/rendition");
        let mut req = input(StorageKind::Local, "m/e/d/i/a_dir/image_orig.jpg", 0, 0);
        req.query = "crop=left,top&q=10";
        assert_eq!(
            layout.resolve(&req),
            "/tmp/rendition/m/e/d/i/a_dir/image_orig_0x0.jpg?crop=left,top&q=10"
        );
    }

    #[test]
    fn object_storage_layout_has_no_root() {
        let layout = KeyLayout::object_storage();
        let key = layout.resolve(&input(StorageKind::Remote, "host/a/img.jpg", 1, 1));
        assert_eq!(key, "a/img_1x1.jpg");

        let key = layout.resolve(&input(StorageKind::Remote, "host/img.jpg", 1, 1));
        assert_eq!(key, "img_1x1.jpg");
    }

    #[test]
    fn trailing_slash_on_root_is_ignored() {
        let a = KeyLayout::filesystem("/cache/");
        let b = KeyLayout::filesystem("/cache");
        let req = input(StorageKind::Local, "x/y.jpg", 3, 4);
        assert_eq!(a.resolve(&req), b.resolve(&req));
    }

    #[test]
    fn decode_path_handles_escapes_and_unicode() {
        assert_eq!(decode_path("a%20b/%D1%84%D0%BE%D1%82%D0%BE.jpg"), "a b/фото.jpg");
        assert_eq!(decode_path("plain/path.jpg"), "plain/path.jpg");
    }

    #[test]
    fn override_must_stay_under_root() {
        let layout = KeyLayout::filesystem("/tmp/rendition");
        assert!(layout.accepts_override("/tmp/rendition/a/img_1x1.jpg"));
        assert!(!layout.accepts_override("/etc/passwd"));
        assert!(!layout.accepts_override("/tmp/rendition/../../etc/passwd"));
        assert!(!layout.accepts_override("/tmp/rendition-other/x.jpg"));
        assert!(!layout.accepts_override("/tmp/rendition/"));
        assert!(!layout.accepts_override(""));

        let objects = KeyLayout::object_storage();
        assert!(objects.accepts_override("a/img_1x1.jpg"));
        assert!(!objects.accepts_override("a/../b.jpg"));
    }

    proptest! {
        #[test]
        fn resolve_is_deterministic(
            path in "[a-z0-9._-]{1,12}(/[a-z0-9._-]{1,12}){0,4}",
            w in 0u32..5000,
            h in 0u32..5000,
            webp in any::<bool>(),
            local in any::<bool>(),
        ) {
            let layout = KeyLayout::filesystem("/cache");
            let storage = if local { StorageKind::Local } else { StorageKind::Remote };
            let req = KeyInput { storage, origin_path: &path, size: Size::new(w, h), webp, query: "" };
            let first = layout.resolve(&req);
            prop_assert_eq!(&first, &layout.resolve(&req));
            prop_assert!(first.starts_with("/cache/"));
            let suffix = format!("_{w}x{h}");
            prop_assert!(first.contains(&suffix));
        }
    }
}
