//! Change-feed fan-out for gridsync.
//!
//! - [`BroadcastHub`]: registry of live push subscribers; delivers each
//!   change id to every subscriber and prunes the ones that fail.
//! - [`ChangeFeedListener`]: long-lived `LISTEN` connection to Postgres
//!   that resolves each announced `notification_log` id and hands it to
//!   the hub.

pub mod hub;
pub mod listener;

pub use hub::{BroadcastHub, DeliveryError, Subscriber, SubscriberId};
pub use listener::{ChangeFeedListener, ListenerConfig, ListenerError};
