//! Cursor-based pagination utilities.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;
use uuid::Uuid;

/// Error type for cursor operations.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("Invalid cursor format")]
    InvalidFormat,
    #[error("Invalid cursor encoding")]
    InvalidEncoding,
    #[error("Invalid timestamp in cursor")]
    InvalidTimestamp,
    #[error("Invalid ID in cursor")]
    InvalidId,
}

/// Encodes a cursor from a creation timestamp (epoch milliseconds) and an ID.
///
/// The cursor format is: base64(created_at_millis:uuid)
/// The composite cursor keeps pagination stable across commands created in
/// the same millisecond.
pub fn encode_cursor(created_at_millis: i64, id: Uuid) -> String {
    let raw = format!("{}:{}", created_at_millis, id);
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

/// Decodes a cursor into a `(created_at_millis, id)` pair.
pub fn decode_cursor(cursor: &str) -> Result<(i64, Uuid), CursorError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| CursorError::InvalidEncoding)?;

    let s = String::from_utf8(decoded).map_err(|_| CursorError::InvalidFormat)?;

    let (ts_str, id_str) = s.split_once(':').ok_or(CursorError::InvalidFormat)?;

    let created_at_millis: i64 = ts_str.parse().map_err(|_| CursorError::InvalidTimestamp)?;
    let id = Uuid::parse_str(id_str).map_err(|_| CursorError::InvalidId)?;

    Ok((created_at_millis, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_cursor_roundtrip() {
        let id = Uuid::new_v4();
        let millis = 1_718_000_123_456i64;

        let cursor = encode_cursor(millis, id);
        let (decoded_ts, decoded_id) = decode_cursor(&cursor).unwrap();

        assert_eq!(decoded_ts, millis);
        assert_eq!(decoded_id, id);
    }

    #[test]
    fn test_decode_invalid_base64() {
        let result = decode_cursor("not-valid-base64!!!");
        assert!(matches!(result, Err(CursorError::InvalidEncoding)));
    }

    #[test]
    fn test_decode_missing_colon() {
        // Valid base64 but no colon separator
        let invalid = URL_SAFE_NO_PAD.encode(b"no-colon-here");
        let result = decode_cursor(&invalid);
        assert!(matches!(result, Err(CursorError::InvalidFormat)));
    }

    #[test]
    fn test_decode_invalid_id() {
        let invalid = URL_SAFE_NO_PAD.encode(b"1718000123456:not-a-uuid");
        let result = decode_cursor(&invalid);
        assert!(matches!(result, Err(CursorError::InvalidId)));
    }

    #[test]
    fn test_decode_invalid_timestamp() {
        let raw = format!("not-a-number:{}", Uuid::new_v4());
        let invalid = URL_SAFE_NO_PAD.encode(raw.as_bytes());
        let result = decode_cursor(&invalid);
        assert!(matches!(result, Err(CursorError::InvalidTimestamp)));
    }

    #[test]
    fn test_encode_zero_timestamp() {
        let id = Uuid::new_v4();
        let cursor = encode_cursor(0, id);
        let (decoded_ts, decoded_id) = decode_cursor(&cursor).unwrap();
        assert_eq!(decoded_ts, 0);
        assert_eq!(decoded_id, id);
    }

    #[test]
    fn test_cursor_is_url_safe() {
        let cursor = encode_cursor(1_718_000_123_456, Uuid::new_v4());

        // URL_SAFE_NO_PAD should not contain +, /, or =
        assert!(!cursor.contains('+'));
        assert!(!cursor.contains('/'));
        assert!(!cursor.contains('='));
    }
}
