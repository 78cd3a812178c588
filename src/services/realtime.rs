//! Broadcast fan-out of stop transitions.
//!
//! The engine publishes every applied transition here; viewer-facing
//! transports (the WebSocket handler, or anything else) subscribe and
//! forward. Slow subscribers lag and skip ahead rather than applying
//! backpressure to the engine.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::StopEventUpdate;
use crate::ports::RealtimeNotifier;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ProgressBroadcast {
    tx: broadcast::Sender<StopEventUpdate>,
}

impl ProgressBroadcast {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl Default for ProgressBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeNotifier for ProgressBroadcast {
    fn publish(&self, update: StopEventUpdate) {
        // Send fails only when no subscriber is listening, which is fine.
        let _ = self.tx.send(update);
    }

    fn subscribe(&self, trip_id: Option<Uuid>) -> ProgressSubscription {
        ProgressSubscription {
            trip_id,
            rx: self.tx.subscribe(),
        }
    }
}

/// A live subscription to stop transitions. Dropping it cancels the
/// subscription.
pub struct ProgressSubscription {
    trip_id: Option<Uuid>,
    rx: broadcast::Receiver<StopEventUpdate>,
}

impl ProgressSubscription {
    /// Next update matching the filter, or `None` once the channel closes.
    pub async fn next(&mut self) -> Option<StopEventUpdate> {
        loop {
            match self.rx.recv().await {
                Ok(update) => {
                    if self.trip_id.map_or(true, |id| id == update.trip_id) {
                        return Some(update);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("progress subscriber lagged by {} updates", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(self) {}
}
