//! Client error types.

use gridsync_core::mutation::RowUpdateResult;

/// Errors from talking to the gridsync HTTP service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Server error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Errors from submitting pending edits.
///
/// On any of these the ledger and the cache are left as they were, so the
/// edits can be retried or cancelled.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error(transparent)]
    Transport(#[from] ClientError),

    /// The server answered but flagged the batch as failed.
    #[error("Server rejected the update batch")]
    Rejected,

    /// One or more rows were not updated.
    #[error("{} row(s) were not updated", .0.len())]
    RowsRejected(Vec<RowUpdateResult>),
}
