//! Hub subscriber backing one push-stream response.
//!
//! The hub hands every subscriber the bare change-log id. The subscriber
//! loads the entry, validates its payload and queues the serialized
//! notification for its response body. A subscriber whose body has been
//! dropped reports [`DeliveryError::Closed`], which makes the hub prune it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use gridsync_db::repositories::NotificationLogRepo;
use gridsync_db::DbPool;
use gridsync_events::listener::parse_change_id;
use gridsync_events::{BroadcastHub, DeliveryError, Subscriber, SubscriberId};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Sink half: registered with the hub.
pub struct SseSubscriber {
    pool: DbPool,
    sender: mpsc::UnboundedSender<String>,
}

impl SseSubscriber {
    /// Create a subscriber and the receiver its frames arrive on.
    pub fn new(pool: DbPool) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { pool, sender }, receiver)
    }
}

#[async_trait]
impl Subscriber for SseSubscriber {
    async fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        if self.sender.is_closed() {
            return Err(DeliveryError::Closed);
        }

        let Some(log_id) = parse_change_id(message) else {
            tracing::warn!(message, "Push subscriber received unexpected message");
            return Ok(());
        };

        let entry = match NotificationLogRepo::find_by_id(&self.pool, log_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::warn!(log_id, "Could not load notification for push");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(log_id, error = %e, "Failed to load notification for push");
                return Ok(());
            }
        };

        let notification = match entry.to_notification() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(log_id, error = %e, "Stored notification payload is invalid");
                return Ok(());
            }
        };

        let json = serde_json::to_string(&notification)
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;
        self.sender.send(json).map_err(|_| DeliveryError::Closed)?;

        tracing::debug!(
            log_id,
            table = %notification.table_name,
            action = %notification.action,
            "Pushed notification"
        );
        Ok(())
    }
}

/// Receiver half: the response body's frame source.
///
/// Unregisters its subscriber from the hub when dropped, which happens as
/// soon as the client disconnects.
pub struct SubscriptionStream {
    inner: UnboundedReceiverStream<String>,
    hub: Arc<BroadcastHub>,
    id: SubscriberId,
}

impl SubscriptionStream {
    pub fn new(receiver: mpsc::UnboundedReceiver<String>, hub: Arc<BroadcastHub>, id: SubscriberId) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(receiver),
            hub,
            id,
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                hub.unregister(id).await;
                tracing::debug!(subscriber_id = %id, "Push client disconnected");
            });
        }
    }
}
