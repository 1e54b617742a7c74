//! End-to-end tests: tailer and ingest listener feeding one worker pool.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use enkente::{DispatchConfig, Pipeline, PipelineError};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;
use common::{Recorder, record, write_log};

const POLL: Duration = Duration::from_millis(50);

/// Minimal HTTP/1.1 POST; returns the status code.
async fn post_ingest(addr: SocketAddr, body: &str) -> u16 {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST /ingest HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap()
}

/// Count stays at `expected` for the whole window.
async fn stays_at(recorder: &Recorder, expected: usize, window: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + window;
    while tokio::time::Instant::now() < deadline {
        if recorder.count() != expected {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    recorder.count() == expected
}

/// Empty log, then one message, then a second: each is seen exactly once.
#[tokio::test]
async fn test_tail_emits_each_appended_message_once() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("chat.json");
    write_log(&log, &[]);

    let recorder = Recorder::new();
    let mut pipeline = Pipeline::start(DispatchConfig::default(), recorder.clone()).unwrap();
    pipeline.tail(&log, POLL).unwrap();

    tokio::time::sleep(POLL * 2).await;
    let first = record("s1", 0, "user", "hello");
    write_log(&log, &[first.clone()]);

    assert!(recorder.wait_for(1, Duration::from_secs(1)).await);
    assert!(stays_at(&recorder, 1, Duration::from_millis(200)).await);

    write_log(&log, &[first, record("s1", 1, "system", "hi there")]);

    assert!(recorder.wait_for(2, Duration::from_secs(1)).await);
    assert!(stays_at(&recorder, 2, Duration::from_millis(200)).await);

    let report = pipeline.shutdown().await.unwrap();
    assert_eq!(report.handled, 2);

    let mut sequences: Vec<u64> = recorder.messages().iter().map(|m| m.sequence).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![0, 1]);
}

/// A shorter file is treated as a fresh log and re-emitted.
#[tokio::test]
async fn test_tail_reemits_after_truncation() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("chat.json");
    write_log(
        &log,
        &[
            record("old", 0, "user", "a"),
            record("old", 1, "system", "b"),
            record("old", 2, "user", "c"),
        ],
    );

    let recorder = Recorder::new();
    let config = DispatchConfig {
        workers: 1,
        ..DispatchConfig::default()
    };
    let mut pipeline = Pipeline::start(config, recorder.clone()).unwrap();
    pipeline.tail(&log, POLL).unwrap();

    assert!(recorder.wait_for(3, Duration::from_secs(1)).await);

    tokio::time::sleep(POLL * 2).await;
    write_log(&log, &[record("new", 0, "user", "fresh")]);

    assert!(recorder.wait_for(4, Duration::from_secs(1)).await);
    assert!(stays_at(&recorder, 4, Duration::from_millis(200)).await);
    pipeline.shutdown().await.unwrap();

    let messages = recorder.messages();
    let order: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c", "fresh"]);
}

/// Tailer and HTTP producers share the queue without loss or duplication.
#[tokio::test]
async fn test_tailer_and_ingest_share_the_queue() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("chat.json");
    write_log(&log, &[]);

    let recorder = Recorder::new();
    let config = DispatchConfig {
        queue_capacity: 4,
        workers: 3,
    };
    let mut pipeline = Pipeline::start(config, recorder.clone()).unwrap();
    pipeline.tail(&log, POLL).unwrap();
    let addr = pipeline.serve("127.0.0.1:0").await.unwrap();
    assert_ne!(addr.port(), 0);

    let posts = tokio::spawn(async move {
        let mut statuses = Vec::new();
        for i in 0..30 {
            let body = json!({"type": "user", "message": format!("live-{i}")}).to_string();
            statuses.push(post_ingest(addr, &body).await);
        }
        statuses
    });

    let mut records = Vec::new();
    for batch in 0..5 {
        for i in 0..6 {
            let sequence = batch * 6 + i;
            records.push(record("s1", sequence, "user", &format!("log-{sequence}")));
        }
        write_log(&log, &records);
        tokio::time::sleep(POLL * 2).await;
    }

    let statuses = posts.await.unwrap();
    assert!(statuses.iter().all(|&status| status == 202));

    assert!(recorder.wait_for(60, Duration::from_secs(2)).await);
    assert!(stays_at(&recorder, 60, Duration::from_millis(200)).await);

    let report = pipeline.shutdown().await.unwrap();
    assert_eq!(report.handled, 60);
    assert_eq!(report.workers_panicked, 0);

    let bodies: HashSet<String> = recorder.messages().into_iter().map(|m| m.body).collect();
    assert_eq!(bodies.len(), 60);
    assert!(bodies.contains("log-29"));
    assert!(bodies.contains("live-29"));
}

/// Stopping the tailer leaves the listener serving.
#[tokio::test]
async fn test_stop_tailing_keeps_listener() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("chat.json");
    write_log(&log, &[]);

    let recorder = Recorder::new();
    let mut pipeline = Pipeline::start(DispatchConfig::default(), recorder.clone()).unwrap();
    pipeline.tail(&log, POLL).unwrap();
    let addr = pipeline.serve("127.0.0.1:0").await.unwrap();

    pipeline.stop_tailing().await;
    tokio::time::sleep(POLL * 2).await;
    write_log(&log, &[record("s1", 0, "user", "ignored")]);

    let status = post_ingest(addr, r#"{"type":"user","message":"still here"}"#).await;
    assert_eq!(status, 202);

    assert!(recorder.wait_for(1, Duration::from_secs(1)).await);
    assert!(stays_at(&recorder, 1, POLL * 4).await);

    pipeline.shutdown().await.unwrap();
    assert_eq!(recorder.messages()[0].body, "still here");
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let recorder = Recorder::new();
    let mut pipeline = Pipeline::start(DispatchConfig::default(), recorder).unwrap();

    let err = pipeline.serve(&addr).await.unwrap_err();
    assert!(matches!(err, PipelineError::Bind { .. }));
    assert!(err.to_string().contains(&addr));

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_zero_poll_interval_is_rejected() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("chat.json");
    write_log(&log, &[record("s1", 0, "user", "hello")]);

    let recorder = Recorder::new();
    let mut pipeline = Pipeline::start(DispatchConfig::default(), recorder.clone()).unwrap();

    let err = pipeline.tail(&log, Duration::ZERO).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInterval));

    // Nothing was spawned, so a valid interval can still be attached.
    pipeline.tail(&log, POLL).unwrap();
    assert!(recorder.wait_for(1, Duration::from_secs(1)).await);

    pipeline.shutdown().await.unwrap();
    assert_eq!(recorder.count(), 1);
}

#[tokio::test]
async fn test_invalid_pool_config_is_rejected() {
    let config = DispatchConfig {
        queue_capacity: 0,
        workers: 1,
    };
    let result = Pipeline::start(config, Recorder::new());
    assert!(matches!(result, Err(PipelineError::Dispatch(_))));
}

#[tokio::test]
async fn test_run_until_signal_drains_queue() {
    let recorder = Recorder::new();
    let mut pipeline = Pipeline::start(DispatchConfig::default(), recorder.clone()).unwrap();
    let addr = pipeline.serve("127.0.0.1:0").await.unwrap();

    assert_eq!(post_ingest(addr, r#"{"type":"user","message":"one"}"#).await, 202);

    let report = pipeline
        .run_until(tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();
    assert_eq!(report.handled, 1);
    assert_eq!(recorder.count(), 1);
}
