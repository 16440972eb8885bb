//! Text ⇄ 32-bit unit conversion
//!
//! Layout:
//! ```text
//! bytes:  b0 b1 b2 b3 | b4 b5 b6 b7 | b8 b9 .. ..
//! units:  u0          | u1          | u2 (zero-padded high bytes)
//! u_i = b[4i] | b[4i+1] << 8 | b[4i+2] << 16 | b[4i+3] << 24
//! ```
//!
//! NUL doubles as the padding byte, so [`decode`] removes every NUL in the
//! reassembled buffer. Text containing NUL therefore does not round-trip;
//! existing ledger data depends on this behavior. [`NulPolicy::TrimPadding`]
//! is available for callers that need interior NULs preserved.

/// Bytes per unit
pub const UNIT_BYTES: usize = 4;

/// How [`decode_with`] treats zero bytes in the reassembled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NulPolicy {
    /// Remove every NUL byte (compatible with data already on the ledger)
    #[default]
    StripAll,
    /// Remove only zero bytes at the tail of the final unit
    TrimPadding,
}

/// Number of units `encode` produces for `byte_len` bytes.
pub fn unit_count(byte_len: usize) -> usize {
    byte_len.div_ceil(UNIT_BYTES)
}

/// Split UTF-8 text into little-endian 32-bit units.
///
/// The empty string yields an empty vector.
pub fn encode(text: &str) -> Vec<u32> {
    encode_bytes(text.as_bytes())
}

/// Split raw bytes into little-endian 32-bit units, zero-padding the last one.
pub fn encode_bytes(bytes: &[u8]) -> Vec<u32> {
    let units: Vec<u32> = bytes
        .chunks(UNIT_BYTES)
        .map(|chunk| {
            let mut word = [0u8; UNIT_BYTES];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect();

    tracing::trace!(bytes = bytes.len(), units = units.len(), "encoded units");
    units
}

/// Reassemble text from units, stripping every NUL byte.
///
/// Accepts any unsigned width; values wider than 32 bits are truncated to
/// their low 32 bits before byte extraction. Invalid UTF-8 is replaced with
/// U+FFFD rather than failing.
pub fn decode<U>(units: &[U]) -> String
where
    U: Copy + Into<u128>,
{
    decode_with(units, NulPolicy::StripAll)
}

/// Reassemble text from units with an explicit NUL policy.
pub fn decode_with<U>(units: &[U], policy: NulPolicy) -> String
where
    U: Copy + Into<u128>,
{
    let mut bytes = unit_bytes(units);
    match policy {
        NulPolicy::StripAll => bytes.retain(|b| *b != 0),
        NulPolicy::TrimPadding => {
            let mut trimmed = 0;
            while trimmed < UNIT_BYTES - 1 && bytes.last() == Some(&0) {
                bytes.pop();
                trimmed += 1;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Reassemble raw bytes from units, stripping every NUL byte.
pub fn decode_bytes<U>(units: &[U]) -> Vec<u8>
where
    U: Copy + Into<u128>,
{
    let mut bytes = unit_bytes(units);
    bytes.retain(|b| *b != 0);
    bytes
}

/// Truncate a possibly-wide value to a unit.
pub fn normalize<U>(value: U) -> u32
where
    U: Into<u128>,
{
    (value.into() & u128::from(u32::MAX)) as u32
}

fn unit_bytes<U>(units: &[U]) -> Vec<u8>
where
    U: Copy + Into<u128>,
{
    let mut bytes = Vec::with_capacity(units.len() * UNIT_BYTES);
    for unit in units {
        bytes.extend_from_slice(&normalize(*unit).to_le_bytes());
    }
    bytes
}
