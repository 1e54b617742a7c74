//! Local filesystem key-value store.
//!
//! Layout: one directory per bucket under the root, one file per key. File names
//! are the hex encoding of the key so arbitrary keys stay filesystem-safe.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::debug;

use super::traits::DEFAULT_BUCKETS;
use super::{KvStore, StorageError, StorageResult};

/// Longest key accepted; hex doubles it and most filesystems cap names at 255 bytes.
pub const MAX_KEY_LEN: usize = 120;

/// Local filesystem storage implementation.
#[derive(Debug)]
pub struct LocalKvStore {
    /// Base directory for storage.
    root: PathBuf,
    /// Disambiguates temp files of concurrent writers.
    write_seq: AtomicU64,
}

impl LocalKvStore {
    /// Open (or create) a store rooted at `root` with the default buckets.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self {
            root: root.into(),
            write_seq: AtomicU64::new(0),
        };
        fs::create_dir_all(&store.root).await?;
        for bucket in DEFAULT_BUCKETS {
            store.create_bucket(bucket).await?;
        }
        debug!("Opened key-value store at {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> StorageResult<PathBuf> {
        let valid = !bucket.is_empty()
            && !bucket.starts_with('.')
            && !bucket.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::InvalidBucket(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    /// Directory of a bucket that must already exist.
    async fn existing_bucket(&self, bucket: &str) -> StorageResult<PathBuf> {
        let dir = self.bucket_dir(bucket)?;
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(StorageError::BucketNotFound(bucket.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

fn key_file_name(key: &str) -> StorageResult<String> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(hex::encode(key))
}

#[async_trait]
impl KvStore for LocalKvStore {
    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        let dir = self.bucket_dir(bucket)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn buckets(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn put(&self, bucket: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        let dir = self.existing_bucket(bucket).await?;
        let file_name = key_file_name(key)?;

        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));
        fs::write(&tmp, value).await?;
        if let Err(e) = fs::rename(&tmp, dir.join(&file_name)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::Io(e));
        }

        debug!("Stored {} bytes in {}/{}", value.len(), bucket, key);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let dir = self.existing_bucket(bucket).await?;
        let file_name = key_file_name(key)?;

        match fs::read(dir.join(file_name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CHAT_BUCKET, CONCEPT_BUCKET, EDGE_BUCKET};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn create_test_store() -> (LocalKvStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalKvStore::open(temp_dir.path().join("db")).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_open_creates_default_buckets() {
        let (store, _dir) = create_test_store().await;

        let buckets = store.buckets().await.unwrap();
        assert_eq!(buckets, vec![CHAT_BUCKET, CONCEPT_BUCKET, EDGE_BUCKET]);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _dir) = create_test_store().await;

        store
            .put(CHAT_BUCKET, "session-1/msg-0", b"hello world")
            .await
            .unwrap();
        let value = store.get(CHAT_BUCKET, "session-1/msg-0").await.unwrap();

        assert_eq!(value, Some(b"hello world".to_vec()));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (store, _dir) = create_test_store().await;

        store.put(EDGE_BUCKET, "a->b", b"first").await.unwrap();
        store.put(EDGE_BUCKET, "a->b", b"second").await.unwrap();

        let value = store.get_string(EDGE_BUCKET, "a->b").await.unwrap();
        assert_eq!(value.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let (store, _dir) = create_test_store().await;

        assert_eq!(store.get(CONCEPT_BUCKET, "nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_bucket() {
        let (store, _dir) = create_test_store().await;

        let err = store.put("Nope", "k", b"v").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(ref b) if b == "Nope"));

        let err = store.get("Nope", "k").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_names() {
        let (store, _dir) = create_test_store().await;

        assert!(matches!(
            store.create_bucket("../escape").await,
            Err(StorageError::InvalidBucket(_))
        ));
        assert!(matches!(
            store.put(CHAT_BUCKET, "", b"v").await,
            Err(StorageError::InvalidKey(_))
        ));
        let long_key = "k".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(
            store.put(CHAT_BUCKET, &long_key, b"v").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = LocalKvStore::open(temp_dir.path()).await.unwrap();
            store.create_bucket("Extra").await.unwrap();
            store.put("Extra", "k", b"persisted").await.unwrap();
        }

        let store = LocalKvStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(
            store.get("Extra", "k").await.unwrap(),
            Some(b"persisted".to_vec())
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                store
                    .put(CHAT_BUCKET, &format!("key-{}", i % 4), format!("{i}").as_bytes())
                    .await
                    .unwrap();
            });
        }
        while let Some(done) = tasks.join_next().await {
            done.unwrap();
        }

        for i in 0..4 {
            assert!(store.get(CHAT_BUCKET, &format!("key-{i}")).await.unwrap().is_some());
        }
        // No temp files left behind.
        let mut entries = std::fs::read_dir(store.root().join(CHAT_BUCKET)).unwrap();
        assert!(entries.all(|e| !e.unwrap().file_name().to_string_lossy().starts_with('.')));
    }
}
