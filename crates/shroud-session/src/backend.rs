//! Encryption backend seam
//!
//! The homomorphic engine and its decryption relayer are external. This
//! module fixes the shape the session expects of them: a batch builder that
//! takes 32-bit units one at a time, and a batched user-decrypt call gated by
//! a signed authorization.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use shroud_core::hex::to_prefixed_hex;
use shroud_core::{Address, ShroudError, ShroudResult, HANDLE_SIZE};
use shroud_crypto::{AuthorizationToken, KeySource};

/// Output of one finalized input batch, in backend-native form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBatch {
    /// One handle per unit, in the order the units were added
    pub handles: Vec<Vec<u8>>,
    pub input_proof: Vec<u8>,
}

/// Builder for one batch bound to a (contract, recipient) pair
#[async_trait]
pub trait EncryptedInput: Send {
    fn add32(&mut self, value: u32);

    async fn encrypt(self: Box<Self>) -> ShroudResult<EncryptedBatch>;
}

/// Cleartext returned by the relayer for one handle.
///
/// Some relayer paths return plain numbers, others arbitrary-precision
/// decimal strings. Either way only the low 32 bits are meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClearValue {
    Uint(u64),
    BigUint(String),
}

impl ClearValue {
    /// Reduce to a unit (value mod 2^32).
    pub fn to_unit(&self) -> ShroudResult<u32> {
        match self {
            ClearValue::Uint(v) => Ok(shroud_codec::normalize(*v)),
            ClearValue::BigUint(digits) => {
                let digits = digits.trim();
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ShroudError::Other(anyhow::anyhow!(
                        "relayer returned a non-decimal clear value: {digits:?}"
                    )));
                }
                let modulus = 1u64 << 32;
                let low = digits
                    .bytes()
                    .fold(0u64, |acc, b| (acc * 10 + u64::from(b - b'0')) % modulus);
                Ok(low as u32)
            }
        }
    }
}

/// A handle paired with the contract it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleContractPair {
    pub handle: Vec<u8>,
    pub contract: Address,
}

impl HandleContractPair {
    pub fn handle_hex(&self) -> String {
        to_prefixed_hex(&self.handle)
    }
}

/// Everything the relayer needs to re-encrypt a batch of handles for one
/// requester. Built from a signed token, which it consumes.
#[derive(Debug)]
pub struct UserDecryptRequest {
    pub pairs: Vec<HandleContractPair>,
    pub private_key: SecretString,
    pub public_key: String,
    /// Signature hex without the `0x` prefix
    pub signature: String,
    pub contract_addresses: Vec<Address>,
    pub user_address: Address,
    pub start_timestamp: String,
    pub duration_days: String,
}

impl UserDecryptRequest {
    pub fn new(pairs: Vec<HandleContractPair>, token: AuthorizationToken) -> Self {
        Self {
            pairs,
            private_key: token.keypair.private_key_hex(),
            public_key: token.keypair.public_key_hex(),
            signature: token.signature.to_hex_unprefixed(),
            contract_addresses: token.scope,
            user_address: token.signer,
            start_timestamp: token.start_timestamp,
            duration_days: token.duration_days,
        }
    }
}

/// The homomorphic encryption service.
///
/// Keypair generation and typed-data construction come from [`KeySource`];
/// backends that need their own formats override those methods.
///
/// `user_decrypt` returns cleartext keyed by the `0x` hex of each native
/// handle. Implementations report ACL rejections as
/// [`ShroudError::AccessDenied`] and network failures as
/// [`ShroudError::RelayerUnreachable`]. `allow` rejects handles the caller
/// cannot address with [`ShroudError::AccessDenied`].
#[async_trait]
pub trait FheBackend: KeySource {
    /// Native handle width in bytes (at most 32)
    fn handle_width(&self) -> usize {
        HANDLE_SIZE
    }

    async fn create_encrypted_input(
        &self,
        contract: Address,
        recipient: Address,
    ) -> ShroudResult<Box<dyn EncryptedInput>>;

    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> ShroudResult<HashMap<String, ClearValue>>;

    /// Add `reader` to the ACL of every handle in `pairs`. All or nothing.
    async fn allow(&self, pairs: &[HandleContractPair], reader: Address) -> ShroudResult<()>;
}
