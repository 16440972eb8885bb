use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ShroudError, ShroudResult};
use crate::hex::{from_prefixed_hex, pad_hex_right, strip_prefix, to_prefixed_hex};

/// Width of a ciphertext handle as stored on the ledger (bytes32)
pub const HANDLE_SIZE: usize = 32;

/// Width of a ledger account / contract address
pub const ADDRESS_SIZE: usize = 20;

/// Ledger record identifier
pub type RecordId = u64;

/// A 20-byte ledger address (account or contract).
///
/// Parsing is case-insensitive; display is always lowercase `0x` hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_SIZE]);

    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ShroudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = strip_prefix(s.trim());
        if digits.len() != ADDRESS_SIZE * 2 {
            return Err(ShroudError::Config(format!(
                "address must be {} hex digits, got {}: {s}",
                ADDRESS_SIZE * 2,
                digits.len()
            )));
        }
        let bytes = ::hex::decode(digits)
            .map_err(|e| ShroudError::Config(format!("invalid address {s}: {e}")))?;
        <[u8; ADDRESS_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| ShroudError::Config(format!("invalid address {s}")))
    }
}

impl TryFrom<String> for Address {
    type Error = ShroudError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_prefixed_hex(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Opaque identifier for one encrypted unit, as returned by the encryption
/// backend and stored on the ledger.
///
/// Always 32 bytes; rendered as `0x` + 64 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CiphertextHandle([u8; HANDLE_SIZE]);

impl CiphertextHandle {
    /// The all-zero handle the ledger returns for an unset slot.
    pub const ZERO: CiphertextHandle = CiphertextHandle([0u8; HANDLE_SIZE]);

    pub fn from_bytes(bytes: [u8; HANDLE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from a backend-native handle of any width up to 32 bytes,
    /// right-padding with zero bytes.
    pub fn from_backend_bytes(raw: &[u8]) -> ShroudResult<Self> {
        if raw.len() > HANDLE_SIZE {
            return Err(ShroudError::MalformedHandle(format!(
                "backend handle is {} bytes, ledger slots hold {HANDLE_SIZE}",
                raw.len()
            )));
        }
        let mut out = [0u8; HANDLE_SIZE];
        out[..raw.len()].copy_from_slice(raw);
        Ok(Self(out))
    }

    /// Recover the backend-native byte form of `width` bytes.
    ///
    /// Fails when `width` exceeds 32 or when the bytes beyond `width` are not
    /// the zero padding added by [`CiphertextHandle::from_backend_bytes`].
    pub fn to_native(&self, width: usize) -> ShroudResult<Vec<u8>> {
        if width == 0 || width > HANDLE_SIZE {
            return Err(ShroudError::MalformedHandle(format!(
                "unsupported native handle width {width}"
            )));
        }
        if self.0[width..].iter().any(|b| *b != 0) {
            return Err(ShroudError::MalformedHandle(format!(
                "{self} does not fit a {width}-byte backend handle"
            )));
        }
        Ok(self.0[..width].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }
}

impl FromStr for CiphertextHandle {
    type Err = ShroudError;

    /// Accepts `0x`-prefixed or bare hex. Shorter input is right-padded with
    /// `0` digits (the ledger's bytes32 convention); longer input is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = strip_prefix(s.trim());
        if digits.len() > HANDLE_SIZE * 2 {
            return Err(ShroudError::MalformedHandle(format!(
                "{} hex digits exceed bytes32: {s}",
                digits.len()
            )));
        }
        let padded = pad_hex_right(digits, HANDLE_SIZE * 2);
        let bytes = ::hex::decode(&padded)
            .map_err(|e| ShroudError::MalformedHandle(format!("{s}: {e}")))?;
        <[u8; HANDLE_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| ShroudError::MalformedHandle(format!("{s} is not bytes32")))
    }
}

impl TryFrom<String> for CiphertextHandle {
    type Error = ShroudError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CiphertextHandle> for String {
    fn from(h: CiphertextHandle) -> Self {
        h.to_hex()
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({self})")
    }
}

/// Proof that a batch of handles was honestly built for one
/// (contract, recipient) pair.
///
/// Not `Clone`: the proof is consumed by exactly one ledger write.
#[derive(PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct InputProof(Vec<u8>);

impl InputProof {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }
}

impl TryFrom<String> for InputProof {
    type Error = ShroudError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        from_prefixed_hex(&s)
            .map(Self)
            .map_err(|e| ShroudError::Other(anyhow::anyhow!("invalid input proof hex: {e}")))
    }
}

impl Serialize for InputProof {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl fmt::Debug for InputProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InputProof({} bytes)", self.0.len())
    }
}

/// SHA-256 digest of an access code's hex text; the only form of the code
/// that ever reaches the ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessCodeHash([u8; 32]);

impl AccessCodeHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for AccessCodeHash {
    type Err = ShroudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = from_prefixed_hex(s.trim()).map_err(|_| ShroudError::NotFound)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| ShroudError::NotFound)?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for AccessCodeHash {
    type Error = ShroudError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AccessCodeHash> for String {
    fn from(h: AccessCodeHash) -> Self {
        h.to_string()
    }
}

impl fmt::Display for AccessCodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_prefixed_hex(&self.0))
    }
}

impl fmt::Debug for AccessCodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessCodeHash({self})")
    }
}

/// Ciphertext handles plus the proof that accompanies their first write
#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub handles: Vec<CiphertextHandle>,
    pub proof: InputProof,
}

impl EncryptedPayload {
    pub fn unit_count(&self) -> usize {
        self.handles.len()
    }
}

/// Report category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Fraud,
    Harassment,
    Safety,
    Ethics,
    Legal,
    Environmental,
    Other,
}

/// Report severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Report workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Submitted,
    UnderReview,
    Investigating,
    Resolved,
    Closed,
}

impl Status {
    /// Resolved and closed reports accept no further status changes.
    pub fn is_final(&self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }
}

/// What a ledger record carries besides its ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// Anonymous whistleblowing report addressed to an organization
    Report {
        category: Category,
        severity: Severity,
        status: Status,
        public_notes: String,
        /// Pseudonymous address allowed to read the organization's feedback
        reply_to: Option<Address>,
    },
    /// Private note owned by its author
    Note {
        title: String,
        category: String,
        tags: Vec<String>,
    },
    /// Encrypted task description
    Task { title: String },
    /// Message dropped into someone's inbox
    Message { inbox_id: u64, sender: Address },
}

impl RecordKind {
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Report { .. } => "report",
            RecordKind::Note { .. } => "note",
            RecordKind::Task { .. } => "task",
            RecordKind::Message { .. } => "message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn handle_short_backend_bytes_are_right_padded() {
        let h = CiphertextHandle::from_backend_bytes(&[0xab, 0xcd]).unwrap();
        let hex = h.to_hex();
        assert_eq!(hex.len(), 66);
        assert!(hex.starts_with("0xabcd"));
        assert!(hex[6..].chars().all(|c| c == '0'));
    }

    #[test]
    fn handle_wider_than_bytes32_is_malformed() {
        let err = CiphertextHandle::from_backend_bytes(&[1u8; 33]).unwrap_err();
        assert!(matches!(err, ShroudError::MalformedHandle(_)));
    }

    #[test]
    fn handle_parse_pads_short_hex() {
        let h: CiphertextHandle = "0xabcd".parse().unwrap();
        assert_eq!(&h.as_bytes()[..2], &[0xab, 0xcd]);
        assert!(h.as_bytes()[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn handle_parse_rejects_garbage() {
        assert!(matches!(
            "0xnothex".parse::<CiphertextHandle>(),
            Err(ShroudError::MalformedHandle(_))
        ));
        assert!(matches!(
            format!("0x{}", "a".repeat(66)).parse::<CiphertextHandle>(),
            Err(ShroudError::MalformedHandle(_))
        ));
    }

    #[test]
    fn handle_to_native_checks_padding() {
        let h = CiphertextHandle::from_backend_bytes(&[7u8; 20]).unwrap();
        assert_eq!(h.to_native(20).unwrap(), vec![7u8; 20]);
        assert!(h.to_native(16).is_err(), "non-zero bytes past width");
        assert!(h.to_native(33).is_err());
    }

    #[test]
    fn zero_handle_detected() {
        let h: CiphertextHandle = format!("0x{}", "0".repeat(64)).parse().unwrap();
        assert!(h.is_zero());
        assert_eq!(h, CiphertextHandle::ZERO);
    }

    #[test]
    fn address_parse_is_case_insensitive() {
        let a: Address = "0xAbCdEf0123456789abcdef0123456789ABCDEF01".parse().unwrap();
        assert_eq!(a.to_string(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn doubled_prefix_is_an_error_not_a_panic() {
        let addr = format!("0x0x{}", "a".repeat(38));
        assert!(matches!(addr.parse::<Address>(), Err(ShroudError::Config(_))));
        assert!(matches!(
            "0x0xab".parse::<CiphertextHandle>(),
            Err(ShroudError::MalformedHandle(_))
        ));

        #[derive(Debug, Deserialize)]
        struct Slot {
            #[allow(dead_code)]
            h: CiphertextHandle,
        }
        assert!(toml::from_str::<Slot>("h = \"0x0xab\"").is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let h = CiphertextHandle::from_backend_bytes(&[0x01]).unwrap();
        let json = serde_json_like(&h);
        assert_eq!(json, format!("\"0x01{}\"", "0".repeat(62)));
    }

    fn serde_json_like(h: &CiphertextHandle) -> String {
        // toml cannot serialize a bare string, so wrap and unwrap a table
        #[derive(Serialize)]
        struct Wrap<'a> {
            h: &'a CiphertextHandle,
        }
        let s = toml::to_string(&Wrap { h }).unwrap();
        s.trim().trim_start_matches("h = ").to_string()
    }

    #[test]
    fn status_finality() {
        assert!(Status::Closed.is_final());
        assert!(Status::Resolved.is_final());
        assert!(!Status::Investigating.is_final());
    }

    proptest! {
        #[test]
        fn handle_hex_always_bytes32(raw in proptest::collection::vec(any::<u8>(), 0..=32)) {
            let h = CiphertextHandle::from_backend_bytes(&raw).unwrap();
            let hex = h.to_hex();
            prop_assert_eq!(hex.len(), 66);
            prop_assert!(hex.starts_with("0x"));
            prop_assert!(hex[2..].chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            let back: CiphertextHandle = hex.parse().unwrap();
            prop_assert_eq!(back, h);
        }
    }
}
