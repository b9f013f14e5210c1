//! Push-stream plumbing: one [`SseSubscriber`] per open
//! `GET /api/table/notifications` response.

pub mod subscriber;

pub use subscriber::{SseSubscriber, SubscriptionStream};
