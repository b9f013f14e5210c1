//! Domain core of the gridsync table editor.
//!
//! Pure, I/O-free building blocks shared by the server and the client:
//!
//! - [`pending`]: the pending-edit ledger behind optimistic cell editing.
//! - [`cache`]: the paginated row cache contract and its in-memory provider.
//! - [`notification`]: change notifications and their validation.
//! - [`schema`]: the column allow-list of `data_table`.
//! - [`cursor`], [`page`], [`mutation`]: pagination and update wire types.
//! - [`backoff`]: the reconnect policy used by every long-lived connection.

pub mod backoff;
pub mod cache;
pub mod cursor;
pub mod error;
pub mod mutation;
pub mod notification;
pub mod page;
pub mod pending;
pub mod schema;
pub mod types;
