//! shroud-crypto: access codes and the decryption authorization handshake
//!
//! ```text
//! submit:  generate() ──▶ AccessCode ──▶ hash() ──▶ AccessCodeHash ──▶ ledger
//! decrypt: build_token() ──▶ AuthorizationRequest ──▶ sign(Signer) ──▶ AuthorizationToken
//! ```
//!
//! Nothing here talks to the network. The wallet sits behind [`Signer`].

pub mod access;
pub mod authorization;
pub mod keypair;
pub mod signer;

pub use access::{generate as generate_access_code, hash as hash_access_code, hash_text, AccessCode};
pub use authorization::{
    build_token, build_token_at, sign, AuthorizationPolicy, AuthorizationRequest,
    AuthorizationToken, KeySource, LocalKeys, Signature, TypedData, TypedDataDomain,
};
pub use keypair::DecryptionKeypair;
pub use signer::Signer;
