use crate::dispatch::MessageSender;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Producer handle onto the dispatcher queue shared with the tailer
    pub sender: MessageSender,
}

impl AppState {
    pub fn new(sender: MessageSender) -> Self {
        Self { sender }
    }
}
