//! Message handlers that workers hand dispatched messages to.
//!
//! - [`ConsoleSink`] prints one line per message.
//! - [`StoreSink`] keeps every message in the `ChatLogs` bucket of a [`KvStore`].
//! - [`FanoutSink`] calls several handlers in turn.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::dispatch::MessageHandler;
use crate::message::Message;
use crate::storage::{CHAT_BUCKET, KvStore};

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";
const DARK_GRAY: &str = "\x1b[90m";

/// Colors used by [`ConsoleSink`]. Empty strings disable styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleStyle {
    pub time: &'static str,
    pub worker: &'static str,
    pub user: &'static str,
    pub other: &'static str,
    pub reset: &'static str,
}

impl ConsoleStyle {
    /// Gray time, cyan worker, green user turns, blue for everything else.
    pub const fn ansi() -> Self {
        Self {
            time: DARK_GRAY,
            worker: CYAN,
            user: GREEN,
            other: BLUE,
            reset: RESET,
        }
    }

    pub const fn plain() -> Self {
        Self {
            time: "",
            worker: "",
            user: "",
            other: "",
            reset: "",
        }
    }

    /// `[HH:MM:SS] [Worker-N] type: message`, the time in the message's own offset.
    pub fn format(&self, worker_id: usize, message: &Message) -> String {
        let color = if message.kind.is_user() {
            self.user
        } else {
            self.other
        };
        format!(
            "{}[{}]{} {}[Worker-{}]{} {}{}: {}{}",
            self.time,
            message.timestamp.format("%H:%M:%S"),
            self.reset,
            self.worker,
            worker_id,
            self.reset,
            color,
            message.kind,
            message.body,
            self.reset
        )
    }
}

impl Default for ConsoleStyle {
    fn default() -> Self {
        Self::ansi()
    }
}

/// Prints every message as one line.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    style: ConsoleStyle,
}

impl ConsoleSink {
    pub fn new(out: Box<dyn Write + Send>, style: ConsoleStyle) -> Self {
        Self {
            out: Mutex::new(out),
            style,
        }
    }

    pub fn stdout(style: ConsoleStyle) -> Self {
        Self::new(Box::new(io::stdout()), style)
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("console writer poisoned"))?;
        writeln!(out, "{line}")?;
        out.flush()
    }
}

#[async_trait]
impl MessageHandler for ConsoleSink {
    async fn handle(&self, worker_id: usize, message: Message) {
        let line = self.style.format(worker_id, &message);
        if let Err(e) = self.write_line(&line) {
            debug!("console write failed: {}", e);
        }
    }
}

/// Key under which a message is kept in [`CHAT_BUCKET`].
///
/// Sorts by session, then sequence. The timestamp keeps live messages, which all
/// share sequence 0, from overwriting each other.
pub fn chat_key(message: &Message) -> String {
    format!(
        "{}/{:010}/{}",
        message.session_id,
        message.sequence,
        message.timestamp.timestamp_micros()
    )
}

/// Persists each message as JSON into the chat bucket.
pub struct StoreSink<S: KvStore + ?Sized> {
    store: Arc<S>,
}

impl<S: KvStore + ?Sized> StoreSink<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: KvStore + ?Sized + 'static> MessageHandler for StoreSink<S> {
    async fn handle(&self, worker_id: usize, message: Message) {
        let key = chat_key(&message);
        let value = match serde_json::to_vec(&message) {
            Ok(value) => value,
            Err(e) => {
                warn!(worker_id, key = %key, "failed to encode message: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.put(CHAT_BUCKET, &key, &value).await {
            warn!(worker_id, key = %key, "failed to store message: {}", e);
        }
    }
}

/// Hands every message to each inner handler, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MessageHandler>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MessageHandler>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl MessageHandler for FanoutSink {
    async fn handle(&self, worker_id: usize, message: Message) {
        let Some((last, rest)) = self.sinks.split_last() else {
            return;
        };
        for sink in rest {
            sink.handle(worker_id, message.clone()).await;
        }
        last.handle(worker_id, message).await;
    }
}
