//! Authenticated encryption of message payloads.
//!
//! Every message is sealed with AES-256-GCM under the conversation secret and
//! a fresh random 96-bit nonce. The transport form is
//! `base64(nonce || ciphertext || tag)`, which is what the web client writes,
//! so envelopes produced here decrypt there and vice versa.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CodecError;
use crate::secret::Secret;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// One encrypted message.
///
/// Immutable once produced; one envelope corresponds to exactly one plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// Random nonce, unique per encryption.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// 128-bit GCM authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl MessageEnvelope {
    /// Concatenate `nonce || ciphertext || tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Split raw bytes back into an envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < NONCE_LEN {
            return Err(CodecError::MalformedEnvelope(format!(
                "{} bytes is shorter than the {}-byte nonce",
                bytes.len(),
                NONCE_LEN
            )));
        }
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::MalformedEnvelope(format!(
                "{} bytes cannot hold a nonce and a {}-byte tag",
                bytes.len(),
                TAG_LEN
            )));
        }

        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

        let mut envelope = Self {
            nonce: [0u8; NONCE_LEN],
            ciphertext: ciphertext.to_vec(),
            tag: [0u8; TAG_LEN],
        };
        envelope.nonce.copy_from_slice(nonce);
        envelope.tag.copy_from_slice(tag);
        Ok(envelope)
    }

    /// Transport encoding: standard base64 of [`to_bytes`](Self::to_bytes).
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Parse the transport encoding.
    pub fn decode(encoded: &str) -> Result<Self, CodecError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Total size of the raw form.
    pub fn len(&self) -> usize {
        NONCE_LEN + self.ciphertext.len() + TAG_LEN
    }

    /// Envelopes always carry a nonce and a tag.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Symmetric AEAD over message payloads.
///
/// Injected into the key manager so platforms can supply their own primitive.
pub trait MessageCodec: Send + Sync {
    /// Encrypt under a fresh random nonce.
    fn encrypt(&self, plaintext: &[u8], secret: &Secret) -> Result<MessageEnvelope, CodecError>;

    /// Verify the tag and decrypt. Never returns partial plaintext.
    fn decrypt(&self, envelope: &MessageEnvelope, secret: &Secret) -> Result<Vec<u8>, CodecError>;
}

/// AES-256-GCM codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCodec;

impl AesGcmCodec {
    /// Create a codec.
    pub const fn new() -> Self {
        Self
    }

    /// Encrypt with a caller-chosen nonce.
    ///
    /// Reusing a nonce under the same secret breaks confidentiality; this
    /// exists for deterministic vectors only.
    pub fn encrypt_with_nonce(
        &self,
        plaintext: &[u8],
        secret: &Secret,
        nonce: [u8; NONCE_LEN],
    ) -> Result<MessageEnvelope, CodecError> {
        let cipher = Aes256Gcm::new_from_slice(secret.as_bytes())
            .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let split = sealed.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[split..]);
        sealed.truncate(split);

        Ok(MessageEnvelope {
            nonce,
            ciphertext: sealed,
            tag,
        })
    }
}

impl MessageCodec for AesGcmCodec {
    fn encrypt(&self, plaintext: &[u8], secret: &Secret) -> Result<MessageEnvelope, CodecError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        self.encrypt_with_nonce(plaintext, secret, nonce)
    }

    fn decrypt(&self, envelope: &MessageEnvelope, secret: &Secret) -> Result<Vec<u8>, CodecError> {
        let cipher = Aes256Gcm::new_from_slice(secret.as_bytes())
            .map_err(|_| CodecError::AuthenticationFailure)?;

        let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(&envelope.ciphertext);
        sealed.extend_from_slice(&envelope.tag);

        cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), sealed.as_slice())
            .map_err(|_| CodecError::AuthenticationFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flip_bit(envelope: &MessageEnvelope, bit: usize) -> MessageEnvelope {
        let mut bytes = envelope.to_bytes();
        let bit = bit % (bytes.len() * 8);
        bytes[bit / 8] ^= 1 << (bit % 8);
        MessageEnvelope::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_hello_world_envelope() {
        let codec = AesGcmCodec::new();
        let secret = Secret::generate();

        let envelope = codec.encrypt(b"hello world", &secret).unwrap();
        let raw = MessageEnvelope::decode(&envelope.encode()).unwrap().to_bytes();
        assert!(raw.len() >= NONCE_LEN + 11 + TAG_LEN);

        let decrypted = codec.decrypt(&envelope, &secret).unwrap();
        assert_eq!(decrypted, b"hello world");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let codec = AesGcmCodec::new();
        let secret = Secret::generate();

        let a = codec.encrypt(b"same", &secret).unwrap();
        let b = codec.encrypt(b"same", &secret).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a, b);
    }

    #[test]
    fn test_deterministic_given_nonce() {
        let codec = AesGcmCodec::new();
        let secret = Secret::from_bytes([3u8; 32]);

        let a = codec.encrypt_with_nonce(b"payload", &secret, [9u8; 12]).unwrap();
        let b = codec.encrypt_with_nonce(b"payload", &secret, [9u8; 12]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let short = STANDARD.encode([0u8; NONCE_LEN - 1]);
        assert!(matches!(
            MessageEnvelope::decode(&short),
            Err(CodecError::MalformedEnvelope(_))
        ));

        let no_tag = STANDARD.encode([0u8; NONCE_LEN + 4]);
        assert!(matches!(
            MessageEnvelope::decode(&no_tag),
            Err(CodecError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(matches!(
            MessageEnvelope::decode("not base64!!"),
            Err(CodecError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let codec = AesGcmCodec::new();
        let secret = Secret::generate();

        let envelope = codec.encrypt(b"", &secret).unwrap();
        assert_eq!(envelope.len(), NONCE_LEN + TAG_LEN);
        assert_eq!(codec.decrypt(&envelope, &secret).unwrap(), b"");
    }

    proptest! {
        #[test]
        fn test_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512), key in any::<[u8; 32]>()) {
            let codec = AesGcmCodec::new();
            let secret = Secret::from_bytes(key);
            let envelope = codec.encrypt(&plaintext, &secret).unwrap();
            prop_assert_eq!(codec.decrypt(&envelope, &secret).unwrap(), plaintext);
        }

        #[test]
        fn test_single_bit_flip_detected(
            plaintext in prop::collection::vec(any::<u8>(), 1..128),
            bit in any::<usize>(),
        ) {
            let codec = AesGcmCodec::new();
            let secret = Secret::generate();
            let envelope = codec.encrypt(&plaintext, &secret).unwrap();

            let tampered = flip_bit(&envelope, bit);
            prop_assert_eq!(
                codec.decrypt(&tampered, &secret),
                Err(CodecError::AuthenticationFailure)
            );
        }

        #[test]
        fn test_wrong_secret_rejected(
            plaintext in prop::collection::vec(any::<u8>(), 0..128),
            k1 in any::<[u8; 32]>(),
            k2 in any::<[u8; 32]>(),
        ) {
            prop_assume!(k1 != k2);
            let codec = AesGcmCodec::new();
            let envelope = codec.encrypt(&plaintext, &Secret::from_bytes(k1)).unwrap();
            prop_assert_eq!(
                codec.decrypt(&envelope, &Secret::from_bytes(k2)),
                Err(CodecError::AuthenticationFailure)
            );
        }
    }
}
