//! Live chat-log ingestion.
//!
//! Two producers feed one bounded queue drained by a fixed pool of workers:
//!
//! - [`tailer::Tailer`] polls a JSON-array log file and forwards only the
//!   messages appended since the last poll.
//! - The HTTP [`api`] accepts single live messages on `POST /ingest`.
//!
//! Workers hand every message to a [`dispatch::MessageHandler`]; the [`sink`]
//! module has the console and storage handlers used by the binary.

pub mod api;
pub mod dispatch;
pub mod log_source;
pub mod message;
pub mod pipeline;
pub mod settings;
pub mod sink;
pub mod storage;
pub mod tailer;

pub use dispatch::{
    DispatchConfig, DispatchError, DispatchReport, Dispatcher, MessageHandler, MessageSender,
};
pub use message::{LIVE_SESSION_ID, Message, MessageKind};
pub use pipeline::{Pipeline, PipelineError};
pub use tailer::{TailCursor, Tailer, TickOutcome};
