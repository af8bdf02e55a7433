//! At-rest sealing of cached secrets.
//!
//! Secrets are never written to disk in cleartext. Each row holds
//! `nonce || ChaCha20-Poly1305(secret)` with the conversation id bound as
//! associated data, so a sealed secret cannot be moved to another row.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use chatseal_core::{ConversationId, Secret};

use crate::error::{Result, StoreError};

const NONCE_LEN: usize = 12;
const DERIVE_CONTEXT: &str = "chatseal-store-v1 at-rest sealing key";

/// A 256-bit key used to seal cached secrets.
///
/// Platforms should source the key material from their secure storage
/// (keychain, keystore, TPM-backed file).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageKey([u8; 32]);

impl StorageKey {
    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key from device-bound key material.
    pub fn derive(material: &[u8]) -> Self {
        Self(blake3::derive_key(DERIVE_CONTEXT, material))
    }

    /// Seal a secret for a conversation.
    pub fn seal(&self, conversation: &ConversationId, secret: &Secret) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| StoreError::Sealing(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: secret.as_bytes(),
                    aad: conversation.as_bytes(),
                },
            )
            .map_err(|e| StoreError::Sealing(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Unseal a secret previously sealed for the same conversation.
    pub fn unseal(&self, conversation: &ConversationId, sealed: &[u8]) -> Result<Secret> {
        if sealed.len() < NONCE_LEN {
            return Err(StoreError::Sealing("sealed secret too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| StoreError::Sealing(e.to_string()))?;

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: conversation.as_bytes(),
                    },
                )
                .map_err(|_| StoreError::Sealing("cannot unseal secret".into()))?,
        );

        Secret::from_slice(&plaintext).map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seal_unseal_roundtrip() {
        let key = StorageKey::generate();
        let conversation = ConversationId::from_bytes([1; 32]);
        let secret = Secret::generate();

        let sealed = key.seal(&conversation, &secret).unwrap();
        assert!(!sealed
            .windows(32)
            .any(|w| w == secret.as_bytes().as_slice()));
        assert_eq!(key.unseal(&conversation, &sealed).unwrap(), secret);
    }

    #[test]
    fn test_unseal_wrong_conversation_fails() {
        let key = StorageKey::generate();
        let sealed = key
            .seal(&ConversationId::from_bytes([1; 32]), &Secret::generate())
            .unwrap();

        assert!(key
            .unseal(&ConversationId::from_bytes([2; 32]), &sealed)
            .is_err());
    }

    #[test]
    fn test_unseal_wrong_key_fails() {
        let conversation = ConversationId::from_bytes([1; 32]);
        let sealed = StorageKey::generate()
            .seal(&conversation, &Secret::generate())
            .unwrap();

        assert!(StorageKey::generate().unseal(&conversation, &sealed).is_err());
    }

    #[test]
    fn test_derive_is_deterministic() {
        let conversation = ConversationId::from_bytes([1; 32]);
        let secret = Secret::generate();
        let sealed = StorageKey::derive(b"device").seal(&conversation, &secret).unwrap();

        assert_eq!(
            StorageKey::derive(b"device").unseal(&conversation, &sealed).unwrap(),
            secret
        );
    }

    proptest! {
        #[test]
        fn test_sealed_secret_roundtrips(
            key in any::<[u8; 32]>(),
            conversation in any::<[u8; 32]>(),
            secret in any::<[u8; 32]>(),
        ) {
            let key = StorageKey::from_bytes(key);
            let conversation = ConversationId::from_bytes(conversation);
            let secret = Secret::from_bytes(secret);

            let sealed = key.seal(&conversation, &secret).unwrap();
            prop_assert_eq!(key.unseal(&conversation, &sealed).unwrap(), secret);
        }

        #[test]
        fn test_any_flipped_byte_rejected(
            secret in any::<[u8; 32]>(),
            index in any::<usize>(),
        ) {
            let key = StorageKey::derive(b"device");
            let conversation = ConversationId::from_bytes([7; 32]);

            let mut sealed = key.seal(&conversation, &Secret::from_bytes(secret)).unwrap();
            let index = index % sealed.len();
            sealed[index] ^= 0x01;
            prop_assert!(key.unseal(&conversation, &sealed).is_err());
        }
    }
}
