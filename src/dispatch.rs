//! Broadcast dispatcher: fans change events out to every subscriber

use crate::registry::{ClientRegistry, Notification};
use crate::watcher::ChangeEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What one fan-out pass achieved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

/// Sends notifications to all registered clients, best effort
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ClientRegistry,
}

impl Dispatcher {
    pub fn new(registry: ClientRegistry) -> Self {
        Self { registry }
    }

    /// Offers `notification` to every client in one pass. A client that
    /// cannot take it right now is unregistered, which closes its connection;
    /// the rest of the pass is unaffected.
    pub fn broadcast(&self, notification: Notification) -> BroadcastOutcome {
        let mut delivered = 0;
        let dropped = self.registry.retain(|id, client| match client.offer(notification) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                warn!("Dropping client {id}: {e}");
                false
            }
        });
        BroadcastOutcome { delivered, dropped }
    }

    /// Broadcasts `reload` for each change event until the watcher goes away
    pub async fn run(self, mut events: mpsc::Receiver<ChangeEvent>) {
        while let Some(event) = events.recv().await {
            debug!("Report changed (marker {:?})", event.marker);
            let outcome = self.broadcast(Notification::Reload);
            info!(
                "Broadcast reload: {} delivered, {} dropped (clients: {})",
                outcome.delivered,
                outcome.dropped,
                self.registry.size()
            );
        }
        debug!("Change watcher stopped, dispatcher exiting");
    }
}
