//! Hex conventions shared by every boundary (backend, ledger, signer)
//!
//! Byte arrays are `0x` + lowercase hex, two digits per byte, no separators.
//! 32-byte fields are right-padded with `0` digits when the natural
//! representation is shorter.

/// `0x` + lowercase hex of `bytes`.
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", ::hex::encode(bytes))
}

/// Parse hex with or without a `0x` prefix.
///
/// Odd-length input is left-padded with a single `0` digit, so `0xabc`
/// decodes to `[0x0a, 0xbc]`.
pub fn from_prefixed_hex(s: &str) -> Result<Vec<u8>, ::hex::FromHexError> {
    let digits = strip_prefix(s);
    if digits.len() % 2 == 1 {
        ::hex::decode(format!("0{digits}"))
    } else {
        ::hex::decode(digits)
    }
}

/// Right-pad a hex string with `0` digits to `width` characters (prefix included).
/// Longer input is returned unchanged.
pub fn pad_hex_right(hex: &str, width: usize) -> String {
    let mut out = hex.to_string();
    while out.len() < width {
        out.push('0');
    }
    out
}

/// Right-pad a `0x` handle string to the 66 characters of a bytes32 slot.
pub fn pad_handle_hex(hex: &str) -> String {
    pad_hex_right(hex, 66)
}

pub fn strip_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_hex_is_lowercase() {
        assert_eq!(to_prefixed_hex(&[0xAB, 0x01]), "0xab01");
        assert_eq!(to_prefixed_hex(&[]), "0x");
    }

    #[test]
    fn parse_accepts_missing_prefix() {
        assert_eq!(from_prefixed_hex("ab01").unwrap(), vec![0xab, 0x01]);
        assert_eq!(from_prefixed_hex("0xAB01").unwrap(), vec![0xab, 0x01]);
    }

    #[test]
    fn parse_left_pads_odd_length() {
        assert_eq!(from_prefixed_hex("0xabc").unwrap(), vec![0x0a, 0xbc]);
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(from_prefixed_hex("0xzz").is_err());
    }

    #[test]
    fn pad_right_to_bytes32_width() {
        let padded = pad_hex_right("0xabcd", 66);
        assert_eq!(padded.len(), 66);
        assert!(padded.starts_with("0xabcd0000"));
        assert_eq!(pad_hex_right(&"f".repeat(70), 66).len(), 70);
        assert_eq!(pad_handle_hex("0x01"), format!("0x01{}", "0".repeat(62)));
    }
}
