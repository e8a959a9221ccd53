//! Armored Ed25519 public keys

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha1::{Digest, Sha1};

use crate::armor::{decode_block, encode_block, ArmorError, PUBLIC_KEY_LABEL};

/// Ed25519 public key size (32 bytes)
pub const ED25519_PUBLIC_KEY: usize = 32;

/// Ed25519 signature size (64 bytes)
pub const ED25519_SIGNATURE: usize = 64;

/// A parsed public key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse an armored public-key block
    pub fn from_armored(armored: &str) -> Result<Self, ArmorError> {
        let bytes = decode_block(armored, PUBLIC_KEY_LABEL)?;
        Self::from_slice(&bytes)
    }

    /// Build a key from its raw 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ArmorError> {
        let raw: [u8; ED25519_PUBLIC_KEY] = bytes
            .try_into()
            .map_err(|_| ArmorError::KeyLength(bytes.len()))?;
        VerifyingKey::from_bytes(&raw)
            .map(Self)
            .map_err(|e| ArmorError::InvalidKey(e.to_string()))
    }

    /// Canonical armored form
    pub fn to_armored(&self) -> String {
        encode_block(PUBLIC_KEY_LABEL, self.0.as_bytes())
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; ED25519_PUBLIC_KEY] {
        self.0.as_bytes()
    }

    /// Hex SHA-1 digest of the raw key bytes
    pub fn pubkeyhash(&self) -> String {
        pubkeyhash(self.as_bytes())
    }

    /// Check `signature` over `message`
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.0.verify(message, signature).is_ok()
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

/// Hex SHA-1 digest of raw public key bytes
pub fn pubkeyhash(key_bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn test_armor_roundtrip_keeps_hash() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let key = PublicKey::from(signing_key.verifying_key());

        let armored = key.to_armored();
        assert!(armored.starts_with("-----BEGIN MUTTR PUBLIC KEY BLOCK-----"));

        let parsed = PublicKey::from_armored(&armored).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.pubkeyhash(), key.pubkeyhash());
        assert_eq!(key.pubkeyhash().len(), 40);
    }

    #[test]
    fn test_hash_ignores_armor_whitespace() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let key = PublicKey::from(signing_key.verifying_key());
        let padded = format!("\r\n{}\r\n\r\n", key.to_armored().replace('\n', "\r\n"));

        assert_eq!(
            PublicKey::from_armored(&padded).unwrap().pubkeyhash(),
            key.pubkeyhash()
        );
    }

    #[test]
    fn test_wrong_length_rejected() {
        let block = encode_block(PUBLIC_KEY_LABEL, &[1u8; 16]);
        assert!(matches!(
            PublicKey::from_armored(&block),
            Err(ArmorError::KeyLength(16))
        ));
    }

    #[test]
    fn test_known_digest() {
        // sha1("") is a fixed vector
        assert_eq!(pubkeyhash(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }
}
