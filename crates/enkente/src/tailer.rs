//! Polling change detector for a JSON-array chat log.
//!
//! Every tick the file is stat'ed; when its modification time moved forward the
//! whole array is re-read and compared by length against what was already
//! emitted. Growth emits the new tail, shrinkage (rotation or truncation)
//! re-emits the whole file. A same-length rewrite is invisible by construction.
//!
//! Stat failures are skipped silently and retried on the next tick. Undecodable
//! content (typically a writer caught mid-write) is skipped until the
//! modification time advances again.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::dispatch::MessageSender;
use crate::log_source::{Snapshot, read_snapshot};
use crate::message::Message;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest interval [`Tailer::new`] accepts; shorter ones are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// What one tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NoChange,
    /// New messages appended since the last emission, in file order.
    Delta(Vec<Message>),
    /// The file shrank; the entire new content, in file order.
    Truncated(Vec<Message>),
}

impl TickOutcome {
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            TickOutcome::NoChange => Vec::new(),
            TickOutcome::Delta(messages) | TickOutcome::Truncated(messages) => messages,
        }
    }
}

/// How much of the log has already been forwarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailCursor {
    last_modified: Option<SystemTime>,
    emitted: usize,
}

impl TailCursor {
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// True when `modified` is strictly after the last observed modification time.
    pub fn is_newer(&self, modified: SystemTime) -> bool {
        self.last_modified.is_none_or(|last| modified > last)
    }

    pub fn observe(&mut self, modified: SystemTime) {
        self.last_modified = Some(modified);
    }

    /// Diff a fresh snapshot against the emitted count and advance the cursor.
    pub fn apply(&mut self, snapshot: Snapshot) -> TickOutcome {
        let len = snapshot.len();
        match len.cmp(&self.emitted) {
            Ordering::Greater => {
                let mut messages = snapshot.into_messages();
                let delta = messages.split_off(self.emitted);
                self.emitted = len;
                TickOutcome::Delta(delta)
            }
            Ordering::Less => {
                self.emitted = len;
                TickOutcome::Truncated(snapshot.into_messages())
            }
            Ordering::Equal => TickOutcome::NoChange,
        }
    }
}

/// Watches one log file and feeds new entries to the dispatcher.
#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    interval: Duration,
    cursor: TailCursor,
}

impl Tailer {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(MIN_POLL_INTERVAL),
            cursor: TailCursor::default(),
        }
    }

    /// Run one detection step without emitting anything.
    pub async fn poll(&mut self) -> TickOutcome {
        let modified = match fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified,
            Err(err) => {
                trace!(path = %self.path.display(), error = %err, "stat failed; retrying next tick");
                return TickOutcome::NoChange;
            }
        };

        if !self.cursor.is_newer(modified) {
            return TickOutcome::NoChange;
        }

        // Recorded before the read: a half-written file is picked up again only
        // once the writer moves the modification time forward.
        self.cursor.observe(modified);
        let snapshot = match read_snapshot(&self.path).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "snapshot unreadable; retrying on next change");
                return TickOutcome::NoChange;
            }
        };

        let previous = self.cursor.emitted();
        let outcome = self.cursor.apply(snapshot);
        match &outcome {
            TickOutcome::Delta(messages) => debug!(
                path = %self.path.display(),
                from = previous,
                count = messages.len(),
                "new messages"
            ),
            TickOutcome::Truncated(messages) => info!(
                path = %self.path.display(),
                previous,
                count = messages.len(),
                "log truncated or rotated; re-emitting"
            ),
            TickOutcome::NoChange => trace!(path = %self.path.display(), "touched without growth"),
        }
        outcome
    }

    /// Poll until cancelled, pushing every new message onto the queue in order.
    ///
    /// A full queue blocks the loop, delaying the next poll. Cancellation is
    /// honoured both between ticks and while blocked on a push; anything already
    /// queued is left to the workers.
    pub async fn run(mut self, sender: MessageSender, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "tailer started"
        );

        'poll: loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'poll,
                _ = ticker.tick() => {}
            }
            if sender.is_closed() {
                warn!(path = %self.path.display(), "dispatch queue closed; tailer stopping");
                break 'poll;
            }

            for message in self.poll().await.into_messages() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'poll,
                    sent = sender.submit(message) => {
                        if sent.is_err() {
                            warn!(path = %self.path.display(), "dispatch queue closed; tailer stopping");
                            break 'poll;
                        }
                    }
                }
            }
        }

        info!(
            path = %self.path.display(),
            emitted = self.cursor.emitted(),
            "tailer stopped"
        );
    }

    pub fn spawn(self, sender: MessageSender, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(sender, cancel))
    }
}
