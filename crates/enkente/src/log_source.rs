//! Reads the chat log file as a complete, ordered snapshot.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::message::Message;

/// Errors produced while reading a snapshot.
#[derive(Debug, Error)]
pub enum LogSourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed chat log: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Full content of the log file at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    messages: Vec<Message>,
}

impl Snapshot {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl Deref for Snapshot {
    type Target = [Message];

    fn deref(&self) -> &Self::Target {
        &self.messages
    }
}

/// Decode a JSON array of messages.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, LogSourceError> {
    let messages: Vec<Message> = serde_json::from_slice(bytes)?;
    Ok(Snapshot::new(messages))
}

/// Read and decode the whole log file.
pub async fn read_snapshot(path: &Path) -> Result<Snapshot, LogSourceError> {
    let bytes = fs::read(path).await.map_err(|source| LogSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_snapshot(&bytes)
}
