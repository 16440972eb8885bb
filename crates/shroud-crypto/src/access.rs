//! Anonymous access codes
//!
//! A reporter receives a random code exactly once. Only its SHA-256 digest is
//! written to the ledger, so knowing the code is the sole proof of authorship
//! and the ledger alone cannot link a record back to its author.
//!
//! The digest is taken over the code's lowercase hex *text*, not the raw 16
//! random bytes. Records already on the ledger were indexed that way.

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use shroud_core::{AccessCodeHash, ShroudError, ShroudResult};

/// Random bytes behind an access code (128 bits)
pub const ACCESS_CODE_BYTES: usize = 16;

/// Length of the rendered code in hex characters
pub const ACCESS_CODE_LEN: usize = ACCESS_CODE_BYTES * 2;

/// A bearer credential shown to the reporter once. Never logged, never stored.
pub struct AccessCode(SecretString);

impl AccessCode {
    /// Normalize user input into a code.
    ///
    /// Surrounding whitespace and upper-case hex are accepted. Anything that
    /// is not exactly 32 hex digits is reported as [`ShroudError::NotFound`],
    /// the same outcome as a well-formed code nobody issued.
    pub fn parse(input: &str) -> ShroudResult<Self> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized.len() != ACCESS_CODE_LEN || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ShroudError::NotFound);
        }
        Ok(Self(SecretString::from(normalized)))
    }

    /// The code text, for displaying to its owner.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn hash(&self) -> AccessCodeHash {
        hash_text(self.expose())
    }
}

impl std::fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessCode([REDACTED])")
    }
}

/// Draw a fresh code from the operating system's secure random source.
///
/// There is no weaker fallback: if the OS source fails the code is not issued.
pub fn generate() -> ShroudResult<AccessCode> {
    let mut bytes = [0u8; ACCESS_CODE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ShroudError::EntropyUnavailable(e.to_string()))?;
    let code = hex::encode(bytes);
    bytes.zeroize();
    tracing::debug!("generated access code");
    Ok(AccessCode(SecretString::from(code)))
}

/// SHA-256 over the code's hex text.
pub fn hash(code: &AccessCode) -> AccessCodeHash {
    code.hash()
}

/// SHA-256 over the UTF-8 bytes of arbitrary text.
pub fn hash_text(text: &str) -> AccessCodeHash {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    AccessCodeHash::from_bytes(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn generated_code_is_lowercase_hex() {
        let code = generate().unwrap();
        assert_eq!(code.expose().len(), ACCESS_CODE_LEN);
        assert!(code
            .expose()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn ten_thousand_codes_are_unique() {
        let codes: HashSet<String> = (0..10_000)
            .map(|_| generate().unwrap().expose().to_string())
            .collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn hash_is_sha256_of_text() {
        // FIPS 180-2 test vector
        assert_eq!(
            hash_text("abc").to_string(),
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hash_covers_text_not_raw_bytes() {
        let code = AccessCode::parse("00112233445566778899aabbccddeeff").unwrap();
        let raw = Sha256::digest(hex::decode(code.expose()).unwrap());
        assert_ne!(hash(&code).as_bytes().as_slice(), raw.as_slice());
        assert_eq!(hash(&code), hash_text("00112233445566778899aabbccddeeff"));
    }

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let code = AccessCode::parse("  00112233445566778899AABBCCDDEEFF\n").unwrap();
        assert_eq!(code.expose(), "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn malformed_input_reads_as_not_found() {
        let long = "a".repeat(33);
        for input in ["", "abc", "zz112233445566778899aabbccddeeff", long.as_str()] {
            assert!(
                matches!(AccessCode::parse(input), Err(ShroudError::NotFound)),
                "{input:?}"
            );
        }
    }

    #[test]
    fn debug_does_not_reveal_code() {
        let code = generate().unwrap();
        let shown = format!("{code:?}");
        assert!(!shown.contains(code.expose()));
        assert!(shown.contains("REDACTED"));
    }

    proptest! {
        #[test]
        fn hashing_is_deterministic(s in "[0-9a-f]{32}") {
            let code = AccessCode::parse(&s).unwrap();
            prop_assert_eq!(hash(&code), hash_text(&s));
            prop_assert_eq!(hash(&code), code.hash());
        }
    }
}
