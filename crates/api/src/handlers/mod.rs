//! Request handlers.
//!
//! Each submodule provides the async handler functions for one route
//! group. Handlers delegate to `gridsync_db` repositories and map errors
//! via [`AppError`](crate::error::AppError).

pub mod debug;
pub mod notifications;
pub mod table;
