//! Event Fan-out Bus
//!
//! Re-broadcasts every decoded server push to any number of independent
//! subscribers, in arrival order. The bus keeps only the latest event and
//! the connected flag; subscribers that join late miss earlier events.

use std::collections::HashSet;
use tokio::sync::{broadcast, watch};

use super::messages::{EventKind, InboundEvent};

/// Configuration for the fan-out bus
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Per-subscriber buffer before a slow subscriber starts lagging
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Typed publish/subscribe channel for inbound events
pub struct EventBus {
    broadcast_tx: broadcast::Sender<InboundEvent>,
    latest: watch::Sender<Option<InboundEvent>>,
    connected: watch::Sender<bool>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        let (latest, _) = watch::channel(None);
        let (connected, _) = watch::channel(false);

        Self {
            broadcast_tx,
            latest,
            connected,
        }
    }

    /// Deliver one event to every current subscriber of its kind
    pub fn publish(&self, event: InboundEvent) {
        let kind = event.kind();
        self.latest.send_replace(Some(event.clone()));

        let delivered = self.broadcast_tx.send(event).unwrap_or(0);
        tracing::trace!(%kind, subscribers = delivered, "Broadcast event");
    }

    /// Listen for the given kinds until the returned handle is dropped
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        Subscription {
            rx: self.broadcast_tx.subscribe(),
            kinds: kinds.iter().copied().collect(),
        }
    }

    /// Listen for every kind
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(&EventKind::ALL)
    }

    /// Most recent event received on the connection
    pub fn latest(&self) -> Option<InboundEvent> {
        self.latest.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Receiver that observes connected-flag transitions
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// Number of live subscription handles
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

/// Subscriber handle; dropping it (or calling `unsubscribe`) stops delivery
pub struct Subscription {
    rx: broadcast::Receiver<InboundEvent>,
    kinds: HashSet<EventKind>,
}

impl Subscription {
    /// Next event of a subscribed kind, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged behind, events skipped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`]
    pub fn try_recv(&mut self) -> Option<InboundEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn kinds(&self) -> &HashSet<EventKind> {
        &self.kinds
    }

    /// Explicitly release the handle
    pub fn unsubscribe(self) {}
}
