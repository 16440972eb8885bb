//! Ephemeral decryption keypair
//!
//! The relayer re-encrypts cleartext results to this public key, so each
//! decryption attempt gets a fresh pair that lives only as long as its
//! authorization token.

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::SecretString;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use shroud_core::hex::to_prefixed_hex;
use shroud_core::{ShroudError, ShroudResult};

/// Size of an X25519 key in bytes
pub const KEY_SIZE: usize = 32;

/// X25519 keypair. The secret half is zeroized on drop.
pub struct DecryptionKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl DecryptionKeypair {
    /// Generate a keypair from the OS random source.
    pub fn generate() -> ShroudResult<Self> {
        let mut seed = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| ShroudError::EntropyUnavailable(e.to_string()))?;
        let keypair = Self::from_secret_bytes(seed);
        seed.zeroize();
        Ok(keypair)
    }

    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        self.public.to_bytes()
    }

    /// `0x`-prefixed hex of the public key, as placed in the signed message.
    pub fn public_key_hex(&self) -> String {
        to_prefixed_hex(self.public.as_bytes())
    }

    /// Hex of the secret key, for handing to the backend's decrypt call.
    pub fn private_key_hex(&self) -> SecretString {
        let mut bytes = self.secret.to_bytes();
        let hex = to_prefixed_hex(&bytes);
        bytes.zeroize();
        SecretString::from(hex)
    }
}

impl std::fmt::Debug for DecryptionKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKeypair")
            .field("public", &self.public_key_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn generated_keypairs_differ() {
        let a = DecryptionKeypair::generate().unwrap();
        let b = DecryptionKeypair::generate().unwrap();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn public_key_hex_is_prefixed_32_bytes() {
        let kp = DecryptionKeypair::generate().unwrap();
        let hex = kp.public_key_hex();
        assert_eq!(hex.len(), 2 + KEY_SIZE * 2);
        assert!(hex.starts_with("0x"));
    }

    #[test]
    fn debug_redacts_secret() {
        let kp = DecryptionKeypair::from_secret_bytes([7u8; KEY_SIZE]);
        let shown = format!("{kp:?}");
        assert!(shown.contains("[REDACTED]"));
        let secret_hex = kp.private_key_hex();
        assert!(!shown.contains(&secret_hex.expose_secret()[2..]));
    }
}
