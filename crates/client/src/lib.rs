//! Client side of gridsync: pending-edit submission and live cache
//! reconciliation against the gridsync HTTP service.
//!
//! - [`TableSession`] owns the shared [`TableState`] (edit ledger, page
//!   cache, column schema) and submits or cancels pending edits.
//! - [`SseReconciler`] consumes the server's push stream and merges
//!   remote changes into the same cache without clobbering local edits.

pub mod config;
pub mod error;
pub mod reconciler;
pub mod session;
pub mod sse;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, MutationError};
pub use reconciler::{ConnectionState, SseReconciler, StreamEvent};
pub use session::{SharedTableState, TableSession, TableState};
pub use transport::{HttpTransport, MutationTransport};
