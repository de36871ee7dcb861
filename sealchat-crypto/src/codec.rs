//! Byte sequence <-> base64 text conversions.
//!
//! Keys and ciphertext travel as strings, so every other module goes through
//! here. Standard alphabet with padding; input is never trimmed.

use crate::error::{CryptoError, CryptoResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes bytes as padded standard base64.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

/// Decodes padded standard base64 text.
///
/// Whitespace, URL-safe characters and bad padding are all rejected.
pub fn decode(text: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| CryptoError::MalformedInput(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrip() {
        assert_eq!(encode(b""), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn known_vector() {
        assert_eq!(encode(b"hello"), "aGVsbG8=");
        assert_eq!(decode("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn surrounding_whitespace_is_not_trimmed() {
        assert!(matches!(
            decode(" aGVsbG8=\n"),
            Err(CryptoError::MalformedInput(_))
        ));
    }

    #[test]
    fn url_safe_alphabet_rejected() {
        // 0xfb 0xff encodes to "+/8=" in the standard alphabet
        assert_eq!(encode([0xfb, 0xff]), "+/8=");
        assert!(decode("-_8=").is_err());
    }
}
