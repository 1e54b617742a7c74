use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Every worker has exited, so nothing will ever pop the queue again.
    #[error("dispatch queue is closed")]
    Closed,

    #[error("invalid dispatch configuration: {0}")]
    InvalidConfig(String),
}
