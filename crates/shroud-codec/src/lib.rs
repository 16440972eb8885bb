//! shroud-codec: deterministic text ⇄ unit codec
//!
//! Turns variable-length UTF-8 text into the ordered sequence of unsigned
//! 32-bit units the encryption backend accepts one at a time, and reverses
//! it after decryption. Unit order is the only link between a unit and its
//! position in the original byte stream, so callers must keep it intact
//! through encryption, storage, and decryption.

pub mod units;

pub use units::{
    decode, decode_bytes, decode_with, encode, encode_bytes, normalize, unit_count, NulPolicy,
    UNIT_BYTES,
};
