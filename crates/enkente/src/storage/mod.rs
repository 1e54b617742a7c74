//! Key-value persistence grouped into buckets.
//!
//! Not part of the ingestion path itself; sinks use it to keep what the
//! workers handled.

mod error;
mod local;
mod traits;

pub use error::{StorageError, StorageResult};
pub use local::{LocalKvStore, MAX_KEY_LEN};
pub use traits::{CHAT_BUCKET, CONCEPT_BUCKET, DEFAULT_BUCKETS, EDGE_BUCKET, KvStore};
