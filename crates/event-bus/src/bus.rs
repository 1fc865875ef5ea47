use std::future::Future;

use tokio::sync::broadcast;
use tracing::warn;

use crate::event::ScannerEvent;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process pub/sub over [`ScannerEvent`]. Backed by a broadcast channel:
/// every subscriber gets its own receiver, so a slow or failing subscriber
/// can never block or break dispatch to the others. A receiver that falls
/// too far behind silently misses the oldest events (`RecvError::Lagged`)
/// rather than stalling the publisher — that is this bus's answer to the
/// "no required back-pressure" clause.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScannerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of currently live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. Publishing with zero subscribers
    /// is not an error: the scanner runs fine with nothing listening.
    pub fn publish(&self, event: ScannerEvent) {
        let _ = self.sender.send(event);
    }

    /// Spawn a task draining one subscriber's stream through `handler`, in
    /// emission order. A handler error is logged and the loop continues —
    /// one subscriber's failure is isolated from every other subscriber and
    /// from the publisher.
    pub fn spawn_subscriber<F, Fut>(&self, mut handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(ScannerEvent) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let name = event.name();
                        if let Err(err) = handler(event).await {
                            warn!(event = name, error = %err, "event subscriber failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
