//! Content-addressed image cache.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── 5d41402abc4b2a76b9719d911017c592.jpg
//! └── 0cc175b9c0f1b6a831c399e269772661.png
//! ```
//!
//! An entry's name is the MD5 of its bytes plus the source extension, so an
//! existing entry is never rewritten. New entries are staged in a temp file
//! inside the root and moved into place with a no-clobber rename; readers
//! only ever see complete files.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{CacheConfig, FetchedImage, content_hash};

/// Prefix for staging files; never a valid entry name.
const STAGING_PREFIX: &str = ".incoming-";

/// Result of a `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub path: PathBuf,
    /// False when the entry already existed and nothing was written
    pub created: bool,
}

/// Flat directory of `{md5hex}.{ext}` files.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(&config.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an entry with this hash and extension lives at.
    pub fn path_for(&self, hash: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{hash}.{extension}"))
    }

    /// Create the root directory if absent. Idempotent.
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::store_write(&self.root, e))
    }

    /// Store `bytes` under their content hash.
    pub async fn put(&self, bytes: &[u8], extension: &str) -> Result<StoredEntry> {
        validate_extension(extension)?;
        self.ensure_root().await?;

        let hash = content_hash(bytes);
        let path = self.path_for(&hash, extension);

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| AppError::store_write(&path, e))?;
        if exists {
            log::debug!("Cache hit: {}", path.display());
            return Ok(StoredEntry {
                path,
                created: false,
            });
        }

        let root = self.root.clone();
        let target = path.clone();
        let payload = bytes.to_vec();
        let created = tokio::task::spawn_blocking(move || write_exclusive(&root, &target, &payload))
            .await
            .map_err(|e| AppError::store_write(&path, std::io::Error::other(e)))??;

        if created {
            log::info!("Cached {} bytes at {}", bytes.len(), path.display());
        } else {
            log::debug!("Lost write race for {}, keeping existing entry", path.display());
        }

        Ok(StoredEntry { path, created })
    }

    /// Store a downloaded image.
    pub async fn put_image(&self, image: &FetchedImage) -> Result<StoredEntry> {
        self.put(&image.bytes, &image.extension).await
    }

    /// Fresh read handle to a stored entry.
    ///
    /// Only a plain file name directly under the root is accepted; `..`,
    /// nested directories and paths elsewhere are rejected.
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<tokio::fs::File> {
        let path = path.as_ref();
        if !self.is_entry_path(path) {
            return Err(AppError::validation(format!(
                "{} is not an entry of cache root {}",
                path.display(),
                self.root.display()
            )));
        }
        Ok(tokio::fs::File::open(path).await?)
    }

    fn is_entry_path(&self, path: &Path) -> bool {
        let Ok(rest) = path.strip_prefix(&self.root) else {
            return false;
        };
        let mut components = rest.components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }
}

fn validate_extension(extension: &str) -> Result<()> {
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::validation(format!(
            "invalid cache extension '{extension}'"
        )));
    }
    Ok(())
}

/// Stage `bytes` in `root` and rename onto `target` unless it already exists.
///
/// Returns whether this call created the entry.
fn write_exclusive(root: &Path, target: &Path, bytes: &[u8]) -> Result<bool> {
    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(root)
        .map_err(|e| AppError::store_write(target, e))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| AppError::store_write(target, e))?;

    match staged.persist_noclobber(target) {
        Ok(_) => Ok(true),
        // Same hash means same bytes; the staged copy is dropped and removed.
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(AppError::store_write(target, e.error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_put_addresses_by_md5() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path().join("cache"));

        let entry = store.put(b"hello", "jpg").await.unwrap();
        assert!(entry.created);
        assert_eq!(
            entry.path,
            tmp.path()
                .join("cache")
                .join("5d41402abc4b2a76b9719d911017c592.jpg")
        );
        assert_eq!(std::fs::read(&entry.path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_put_twice_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());

        let first = store.put(b"same bytes", "png").await.unwrap();
        let mtime = std::fs::metadata(&first.path).unwrap().modified().unwrap();

        let second = store.put(b"same bytes", "png").await.unwrap();
        assert_eq!(first.path, second.path);
        assert!(!second.created);
        assert_eq!(
            std::fs::metadata(&second.path).unwrap().modified().unwrap(),
            mtime
        );
        assert_eq!(entries(tmp.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_same_bytes_different_extension_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());

        let jpg = store.put(b"abc", "jpg").await.unwrap();
        let png = store.put(b"abc", "png").await.unwrap();
        assert_ne!(jpg.path, png.path);
        assert!(png.created);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_create_one_entry() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        let bytes = vec![0xAB_u8; 12];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let bytes = bytes.clone();
                tokio::spawn(async move { store.put(&bytes, "jpg").await.unwrap() })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let expected = store.path_for(&content_hash(&bytes), "jpg");
        assert!(results.iter().all(|r| r.path == expected));
        assert_eq!(results.iter().filter(|r| r.created).count(), 1);
        assert_eq!(entries(tmp.path()), vec![format!("{}.jpg", content_hash(&bytes))]);
        assert_eq!(std::fs::read(&expected).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_open_returns_fresh_reader() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        let entry = store.put(b"image data", "gif").await.unwrap();

        for _ in 0..2 {
            let mut file = store.open(&entry.path).await.unwrap();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await.unwrap();
            assert_eq!(buf, b"image data");
        }
    }

    #[tokio::test]
    async fn test_open_rejects_outside_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let store = ContentStore::new(&root);
        store.put(b"entry", "jpg").await.unwrap();
        std::fs::write(tmp.path().join("secret.txt"), b"secret").unwrap();
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("nested").join("x.jpg"), b"x").unwrap();

        for path in [
            tmp.path().join("secret.txt"),
            root.join("..").join("secret.txt"),
            root.join("nested").join("..").join("..").join("secret.txt"),
            root.join("nested").join("x.jpg"),
            root.clone(),
        ] {
            assert!(
                matches!(store.open(&path).await, Err(AppError::Validation(_))),
                "{} should be rejected",
                path.display()
            );
        }
    }

    #[tokio::test]
    async fn test_ensure_root_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path().join("a").join("b"));
        store.ensure_root().await.unwrap();
        store.ensure_root().await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_put_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("cache");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let store = ContentStore::new(&blocker);
        assert!(matches!(
            store.put(b"x", "jpg").await,
            Err(AppError::StoreWriteFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_rejects_bad_extension() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        assert!(store.put(b"x", "").await.is_err());
        assert!(store.put(b"x", "../jpg").await.is_err());
    }
}
