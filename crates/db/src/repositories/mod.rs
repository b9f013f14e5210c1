//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod data_row_repo;
pub mod notification_log_repo;

pub use data_row_repo::{BatchUpdate, ColumnAssignment, DataRowRepo};
pub use notification_log_repo::NotificationLogRepo;
