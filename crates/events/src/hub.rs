//! Registry of push subscribers.
//!
//! The hub is shared as `Arc<BroadcastHub>` between the change-feed
//! listener (which broadcasts) and the HTTP push endpoint (which registers
//! one subscriber per open stream).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Opaque handle returned by [`BroadcastHub::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure to hand a message to one subscriber.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The subscriber's stream has gone away.
    #[error("Subscriber closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// A sink that accepts broadcast messages.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError>;
}

/// Fan-out registry of push subscribers.
///
/// Registration order is delivery order. A subscriber that fails a
/// delivery is removed once the whole pass is over, so one dead stream
/// never blocks the others.
pub struct BroadcastHub {
    subscribers: RwLock<BTreeMap<SubscriberId, Arc<dyn Subscriber>>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a subscriber and return its handle.
    pub async fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().await.insert(id, subscriber);
        tracing::debug!(subscriber_id = %id, "Subscriber registered");
        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) {
        if self.subscribers.write().await.remove(&id).is_some() {
            tracing::debug!(subscriber_id = %id, "Subscriber unregistered");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Deliver `message` to every subscriber in registration order.
    ///
    /// Returns the number of successful deliveries.
    pub async fn broadcast(&self, message: &str) -> usize {
        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
            .collect();

        let mut failed = Vec::new();
        for (id, subscriber) in &snapshot {
            if let Err(e) = subscriber.deliver(message).await {
                tracing::warn!(subscriber_id = %id, error = %e, "Failed to deliver, removing subscriber");
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &failed {
                subscribers.remove(id);
            }
        }

        snapshot.len() - failed.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
