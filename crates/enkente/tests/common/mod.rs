//! Test utilities and common setup.
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use enkente::api::{self, AppState};
use enkente::{DispatchConfig, Dispatcher, Message, MessageHandler};

/// Handler that keeps every message it is given.
#[derive(Default)]
pub struct Recorder {
    seen: Mutex<Vec<(usize, Message)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Wait until at least `count` messages arrived. Returns false on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count() >= count
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, worker_id: usize, message: Message) {
        self.seen.lock().unwrap().push((worker_id, message));
    }
}

/// Spawn a dispatcher feeding `recorder` and an ingest router on top of it.
pub fn test_app(recorder: Arc<Recorder>, config: DispatchConfig) -> (Router, Dispatcher) {
    let dispatcher = Dispatcher::spawn(config, recorder).unwrap();
    let router = api::create_router(AppState::new(dispatcher.sender()));
    (router, dispatcher)
}

/// One log record as the chat client writes it.
pub fn record(session: &str, sequence: u64, kind: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "sessionId": session,
        "messageId": sequence,
        "type": kind,
        "message": body,
        "timestamp": "2025-09-04T21:27:18.909Z",
    })
}

/// Replace the log file with `records`, as a JSON array.
///
/// Written beside the target and renamed over it, so a poll never sees a
/// half-written file.
pub fn write_log(path: &Path, records: &[serde_json::Value]) {
    let body = serde_json::to_vec_pretty(records).unwrap();
    let staging = path.with_extension("json.tmp");
    std::fs::write(&staging, body).unwrap();
    std::fs::rename(&staging, path).unwrap();
}
