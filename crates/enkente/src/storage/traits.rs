//! Storage trait definitions.

use async_trait::async_trait;

use super::StorageResult;

/// Bucket holding raw chat turns.
pub const CHAT_BUCKET: &str = "ChatLogs";
/// Bucket reserved for extracted concepts.
pub const CONCEPT_BUCKET: &str = "Concepts";
/// Bucket reserved for relationships between concepts.
pub const EDGE_BUCKET: &str = "Edges";

/// Buckets every store is opened with.
pub const DEFAULT_BUCKETS: [&str; 3] = [CHAT_BUCKET, CONCEPT_BUCKET, EDGE_BUCKET];

/// Key-value storage grouped into named buckets.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Create a bucket if it does not exist yet.
    async fn create_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Names of all existing buckets, sorted.
    async fn buckets(&self) -> StorageResult<Vec<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, bucket: &str, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Fetch the value under `key`. `Ok(None)` when the key is absent.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Fetch a value as a string.
    async fn get_string(&self, bucket: &str, key: &str) -> StorageResult<Option<String>> {
        Ok(self
            .get(bucket, key)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}
