//! shroud-core: shared types, hex conventions, config schema, and error types

pub mod config;
pub mod error;
pub mod hex;
pub mod types;

pub use error::{ShroudError, ShroudResult};
pub use types::{
    AccessCodeHash, Address, Category, CiphertextHandle, EncryptedPayload, InputProof, RecordId,
    RecordKind, Severity, Status, HANDLE_SIZE,
};
