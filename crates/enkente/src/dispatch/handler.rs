//! The capability invoked by pool workers for every dispatched message.

use async_trait::async_trait;

use crate::message::Message;

/// Consumer of dispatched messages.
///
/// Called once per message from whichever worker popped it. Across workers there
/// is no ordering guarantee. Errors are the handler's own business: the pool does
/// not inspect the outcome and never retries.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, worker_id: usize, message: Message);
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(usize, Message) + Send + Sync + 'static,
{
    async fn handle(&self, worker_id: usize, message: Message) {
        self(worker_id, message)
    }
}
