use async_trait::async_trait;

use shroud_core::{Address, ShroudResult};

use crate::authorization::{Signature, TypedData};

/// Wallet capable of signing typed data on the requester's behalf.
///
/// Implementations map "no wallet connected" to
/// [`ShroudError::SignerUnavailable`](shroud_core::ShroudError::SignerUnavailable)
/// and an explicit refusal to
/// [`ShroudError::UserRejectedSignature`](shroud_core::ShroudError::UserRejectedSignature).
/// Neither is retried.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Ledger address of the account doing the signing
    async fn address(&self) -> ShroudResult<Address>;

    async fn sign_typed_data(&self, data: &TypedData) -> ShroudResult<Signature>;
}
