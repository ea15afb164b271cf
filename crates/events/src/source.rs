//! Event source abstraction (the boundary with the upstream log).
//!
//! The indexer never produces events; it pulls them from a source that reads
//! the registry's emitted log. Sources deliver envelopes in log order per
//! block, may redeliver, and may reorder events within one block. Consumers
//! must be idempotent.

use std::convert::Infallible;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::EventEnvelope;

/// Pull-based stream of envelopes.
///
/// `Ok(None)` means the source is exhausted (end of file, all senders dropped).
#[async_trait]
pub trait EventSource<E>: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn next(&mut self) -> Result<Option<EventEnvelope<E>>, Self::Error>;
}

/// Channel-fed source for tests and embedding.
#[derive(Debug)]
pub struct InMemoryEventSource<E> {
    receiver: mpsc::UnboundedReceiver<EventEnvelope<E>>,
}

/// Sending half of an [`InMemoryEventSource`].
#[derive(Debug, Clone)]
pub struct InMemoryEventSender<E> {
    sender: mpsc::UnboundedSender<EventEnvelope<E>>,
}

impl<E> InMemoryEventSource<E> {
    pub fn channel() -> (InMemoryEventSender<E>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (InMemoryEventSender { sender }, Self { receiver })
    }

    /// A source that yields `envelopes` and then ends.
    pub fn from_envelopes(envelopes: impl IntoIterator<Item = EventEnvelope<E>>) -> Self {
        let (tx, source) = Self::channel();
        for env in envelopes {
            tx.send(env);
        }
        source
    }
}

impl<E> InMemoryEventSender<E> {
    /// Push an envelope; silently dropped if the source is gone.
    pub fn send(&self, envelope: EventEnvelope<E>) {
        let _ = self.sender.send(envelope);
    }
}

#[async_trait]
impl<E> EventSource<E> for InMemoryEventSource<E>
where
    E: Send + 'static,
{
    type Error = Infallible;

    async fn next(&mut self) -> Result<Option<EventEnvelope<E>>, Self::Error> {
        Ok(self.receiver.recv().await)
    }
}
