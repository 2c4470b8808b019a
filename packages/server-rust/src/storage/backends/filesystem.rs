//! [`CacheStore`] backed by files on local disk.
//!
//! Keys are absolute file paths (the cache root is already part of the key).
//! A key that does not stay under the root, or that has a `..` component
//! anywhere, is never touched: reads miss and writes fail.
//! Writes go to a uniquely named temporary file in the destination directory
//! and are renamed into place, so readers never see a partially written
//! rendition.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::storage::CacheStore;

pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the cache root if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Maps `key` to a file under the root, or `None` if it would escape.
    ///
    /// Checked lexically: query strings end up in keys and may contain
    /// `/../` sequences, which `create_dir_all` would otherwise turn into
    /// real directories to climb through.
    fn confine<'k>(&self, key: &'k str) -> Option<&'k Path> {
        let path = Path::new(key);
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return None;
        }
        let rest = path.strip_prefix(&self.root).ok()?;
        rest.components()
            .any(|c| matches!(c, Component::Normal(_)))
            .then_some(path)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        let Some(path) = self.confine(key) else {
            return Ok(None);
        };
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            // Missing, unreadable and directory entries all count as a miss.
            _ => return Ok(None),
        }

        match fs::read(path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let Some(path) = self.confine(key) else {
            return Ok(false);
        };
        Ok(fs::metadata(path).await.is_ok())
    }

    async fn put(&self, key: &str, value: Bytes) -> anyhow::Result<()> {
        let Some(path) = self.confine(key) else {
            bail!("cache key {key:?} escapes {}", self.root.display());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = temp_path_for(path);
        fs::write(&temp, &value).await?;
        if let Err(err) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_in(dir: &tempfile::TempDir, rel: &str) -> String {
        dir.path().join(rel).to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn set_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let key = key_in(&dir, "a/b/c/img_10x10.jpg");

        store.set(&key, Bytes::from_static(b"jpeg")).await.unwrap();

        let got = store.get(&key).await.unwrap();
        assert_eq!(got.as_deref(), Some(&b"jpeg"[..]));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        assert!(store.get(&key_in(&dir, "nope.jpg")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        assert!(store.get(&key_in(&dir, "sub")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_payload_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let key = key_in(&dir, "x/empty_1x1.png");

        store.set(&key, Bytes::new()).await.unwrap();

        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn first_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let key = key_in(&dir, "img_1x1.png");

        store.set(&key, Bytes::from_static(b"first")).await.unwrap();
        store.set(&key, Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"first"[..]));
    }

    #[tokio::test]
    async fn delete_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let key = key_in(&dir, "keep_1x1.png");
        store.set(&key, Bytes::from_static(b"data")).await.unwrap();

        store.delete(&key).await.unwrap();
        assert!(store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let key = key_in(&dir, "d/img_2x2.jpg");
        store.set(&key, Bytes::from_static(b"bytes")).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("d"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["img_2x2.jpg"]);
    }

    #[tokio::test]
    async fn query_with_parent_segments_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let store = FsCacheStore::new(&root);
        let victim = dir.path().join("victim.txt");
        std::fs::write(&victim, b"precious").unwrap();

        let key = format!("{}/media/a_4x4.png?x=/../../../victim.txt", root.display());
        assert!(store.set(&key, Bytes::from_static(b"\x89PNG")).await.is_err());
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.exists(&key).await.unwrap());

        assert_eq!(std::fs::read(&victim).unwrap(), b"precious");
        assert!(!root.join("media").exists());
    }

    #[tokio::test]
    async fn keys_outside_root_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path().join("cache"));
        let outside = dir.path().join("outside.png");
        std::fs::write(&outside, b"png").unwrap();
        let key = outside.to_string_lossy().into_owned();

        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.exists(&key).await.unwrap());
        assert!(store.put(&key, Bytes::from_static(b"x")).await.is_err());
        assert_eq!(std::fs::read(&outside).unwrap(), b"png");

        let root_itself = dir.path().join("cache").to_string_lossy().into_owned();
        assert!(store.get(&root_itself).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_bearing_keys_without_parents_still_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::new(dir.path());
        let key = key_in(&dir, "m/a_2x2.png?crop=left,top&q=10");
        store.set(&key, Bytes::from_static(b"q10")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"q10"[..]));
    }

    #[tokio::test]
    async fn ensure_root_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache/root");
        let store = FsCacheStore::new(&root);
        store.ensure_root().await.unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
        assert_eq!(store.backend(), "filesystem");
    }
}
