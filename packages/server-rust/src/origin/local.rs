//! Originals on the local filesystem.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio::fs;

use super::FetchError;

/// Resolves origin paths against an ordered list of search directories.
///
/// With no directories configured, paths are resolved from `/`.
#[derive(Debug, Clone, Default)]
pub struct LocalOrigin {
    search_dirs: Vec<PathBuf>,
}

impl LocalOrigin {
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Reads the first existing file for `origin_path`.
    ///
    /// # Errors
    ///
    /// [`FetchError::NotFound`] when no directory holds the file or the path
    /// tries to climb out of its directory; [`FetchError::Io`] when the file
    /// exists but cannot be read.
    pub async fn fetch(&self, origin_path: &str) -> Result<Bytes, FetchError> {
        let not_found = || FetchError::NotFound {
            path: origin_path.to_string(),
        };
        let relative = confine(origin_path).ok_or_else(not_found)?;

        let root = [PathBuf::from("/")];
        let dirs = if self.search_dirs.is_empty() {
            &root[..]
        } else {
            &self.search_dirs[..]
        };

        for dir in dirs {
            let candidate = Path::new("/").join(dir).join(&relative);
            if fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
                return read_file(&candidate).await;
            }
        }
        Err(not_found())
    }
}

/// Reads a whole file.
///
/// # Errors
///
/// [`FetchError::NotFound`] for a missing file, [`FetchError::Io`] otherwise.
pub async fn read_file(path: &Path) -> Result<Bytes, FetchError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Bytes::from(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(FetchError::NotFound {
            path: path.display().to_string(),
        }),
        Err(source) => Err(FetchError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Turns an origin path into a relative path with no `..` components.
fn confine(origin_path: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(origin_path).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}
