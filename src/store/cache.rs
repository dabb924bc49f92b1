//! Content-addressed on-disk cache for rendered pages and fetched resources.
//!
//! Every operation is best-effort: failures are logged and reported as a
//! miss, never as an error, since a broken cache must not break a page load.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::app::Result;
use crate::domain::target::attach_input;

/// Bucket holding rendered pages.
pub const PAGE_BUCKET: &str = "pages";

/// Bucket holding downsized inline images.
pub const IMAGE_BUCKET: &str = "images";

const VERSION_FILE: &str = "VERSION";

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identity of a cached page: the normalized request URI with any user
/// input folded into its query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey(String);

impl PageKey {
    pub fn new(uri: &Url, input: Option<&str>) -> Self {
        Self(attach_input(uri, input).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hex SHA-256 of `value`, used for every path segment below the root.
pub fn digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(digest(bucket)).join(digest(key))
    }

    pub async fn try_load_page(&self, key: &PageKey) -> Option<String> {
        let compressed = self.read(PAGE_BUCKET, key.as_str()).await?;

        let decoded = tokio::task::spawn_blocking(move || {
            let mut text = String::new();
            GzDecoder::new(compressed.as_slice())
                .read_to_string(&mut text)
                .map(|_| text)
        })
        .await;

        match decoded {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                warn!("Discarding corrupt cached page {}: {}", key.as_str(), e);
                None
            }
            Err(e) => {
                warn!("Cache decode task failed: {}", e);
                None
            }
        }
    }

    pub async fn store_page(&self, key: &PageKey, text: &str) {
        let text = text.to_owned();
        let encoded = tokio::task::spawn_blocking(move || {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(text.as_bytes())?;
            encoder.finish()
        })
        .await;

        match encoded {
            Ok(Ok(bytes)) => self.write(PAGE_BUCKET, key.as_str(), &bytes).await,
            Ok(Err(e)) => warn!("Failed to compress page {}: {}", key.as_str(), e),
            Err(e) => warn!("Cache encode task failed: {}", e),
        }
    }

    pub async fn resource_exists(&self, bucket: &str, key: &str) -> bool {
        tokio::fs::try_exists(self.entry_path(bucket, key))
            .await
            .unwrap_or(false)
    }

    pub async fn store_resource(&self, bucket: &str, key: &str, bytes: &[u8]) {
        self.write(bucket, key, bytes).await
    }

    pub async fn load_resource(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.read(bucket, key).await
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the cache when it was written by a different application
    /// version, then stamp it with `version`.
    pub async fn ensure_version(&self, version: &str) -> Result<()> {
        let stamp = self.root.join(VERSION_FILE);
        let current = tokio::fs::read_to_string(&stamp).await.ok();

        if current.as_deref().map(str::trim) != Some(version) {
            if current.is_some() {
                tracing::info!(
                    "Cache version changed ({} -> {}), clearing",
                    current.as_deref().unwrap_or("").trim(),
                    version
                );
            }
            self.clear().await?;
            tokio::fs::create_dir_all(&self.root).await?;
            tokio::fs::write(&stamp, version).await?;
        }

        Ok(())
    }

    async fn read(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(bucket, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss {}/{}", bucket, key);
                None
            }
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn write(&self, bucket: &str, key: &str, bytes: &[u8]) {
        let path = self.entry_path(bucket, key);
        if let Err(e) = write_atomically(&path, bytes).await {
            warn!("Failed to write cache entry {}: {}", path.display(), e);
        }
    }
}

/// Write to a unique sibling and rename over the target, so readers never
/// see a partial entry.
async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp{}-{}", std::process::id(), seq));

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn page_key(uri: &str) -> PageKey {
        PageKey::new(&Url::parse(uri).unwrap(), None)
    }

    #[tokio::test]
    async fn test_page_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let key = page_key("gemini://example.org/");

        cache.store_page(&key, "<h1>Hello</h1>").await;
        assert_eq!(
            cache.try_load_page(&key).await.as_deref(),
            Some("<h1>Hello</h1>")
        );
    }

    #[tokio::test]
    async fn test_empty_page_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let key = page_key("gemini://example.org/empty");

        cache.store_page(&key, "").await;
        assert_eq!(cache.try_load_page(&key).await.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_large_page_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let key = page_key("gemini://example.org/big");
        let text: String = (0..200_000).map(|i| format!("line {}\n", i)).collect();
        assert!(text.len() > 2 * 1024 * 1024);

        cache.store_page(&key, &text).await;
        assert_eq!(cache.try_load_page(&key).await, Some(text));
    }

    #[tokio::test]
    async fn test_missing_page_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        assert!(cache
            .try_load_page(&page_key("gemini://example.org/nope"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_corrupt_page_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let key = page_key("gemini://example.org/corrupt");

        cache
            .store_resource(PAGE_BUCKET, key.as_str(), b"definitely not gzip")
            .await;
        assert!(cache.try_load_page(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let key = page_key("gemini://example.org/");

        cache.store_page(&key, "first").await;
        cache.store_page(&key, "second").await;
        assert_eq!(cache.try_load_page(&key).await.as_deref(), Some("second"));

        let bucket_dir = dir.path().join(digest(PAGE_BUCKET));
        assert_eq!(std::fs::read_dir(bucket_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_input_is_part_of_page_identity() {
        let uri = Url::parse("gemini://example.org/search").unwrap();
        let plain = PageKey::new(&uri, None);
        let with_input = PageKey::new(&uri, Some("rust"));
        assert_ne!(plain, with_input);
        assert_eq!(
            with_input,
            PageKey::new(&Url::parse("gemini://example.org/search?rust").unwrap(), None)
        );
    }

    #[tokio::test]
    async fn test_resource_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());

        assert!(!cache.resource_exists(IMAGE_BUCKET, "gemini://a/b.png").await);
        cache
            .store_resource(IMAGE_BUCKET, "gemini://a/b.png", &[1, 2, 3])
            .await;
        assert!(cache.resource_exists(IMAGE_BUCKET, "gemini://a/b.png").await);
        assert_eq!(
            cache.load_resource(IMAGE_BUCKET, "gemini://a/b.png").await,
            Some(vec![1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_layout_partitions_by_hashed_bucket_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        cache.store_resource("bucket", "key", b"x").await;

        let expected = dir.path().join(digest("bucket")).join(digest("key"));
        assert!(expected.is_file());
    }

    #[tokio::test]
    async fn test_unwritable_root_is_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let cache = CacheStore::new(&blocker);

        cache
            .store_page(&page_key("gemini://example.org/"), "text")
            .await;
        assert!(cache
            .try_load_page(&page_key("gemini://example.org/"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = format!("gemini://example.org/{}.png", i);
                    cache.store_resource(IMAGE_BUCKET, &key, &[i as u8; 64]).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..16u8 {
            let key = format!("gemini://example.org/{}.png", i);
            assert_eq!(
                cache.load_resource(IMAGE_BUCKET, &key).await,
                Some(vec![i; 64])
            );
        }
    }

    #[tokio::test]
    async fn test_version_change_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path().join("cache"));
        let key = page_key("gemini://example.org/");

        cache.ensure_version("0.1.0").await.unwrap();
        cache.store_page(&key, "kept").await;
        cache.ensure_version("0.1.0").await.unwrap();
        assert_eq!(cache.try_load_page(&key).await.as_deref(), Some("kept"));

        cache.ensure_version("0.2.0").await.unwrap();
        assert!(cache.try_load_page(&key).await.is_none());
    }
}
