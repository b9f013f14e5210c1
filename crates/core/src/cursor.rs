//! Opaque pagination cursors.
//!
//! A cursor is the base64 encoding of the decimal row id at a page edge.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CoreError;
use crate::types::RowId;

/// Encode a row id as an opaque cursor string.
pub fn encode_cursor(id: RowId) -> String {
    STANDARD.encode(id.to_string())
}

/// Decode a cursor produced by [`encode_cursor`].
///
/// Any malformed input yields [`CoreError::Validation`], which the HTTP
/// layer maps to `400 Bad Request`.
pub fn decode_cursor(cursor: &str) -> Result<RowId, CoreError> {
    let invalid = || CoreError::Validation("Invalid cursor format".to_string());

    let bytes = STANDARD.decode(cursor.trim()).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.parse::<RowId>().map_err(|_| invalid())
}
