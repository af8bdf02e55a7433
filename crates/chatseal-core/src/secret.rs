//! Conversation secrets.
//!
//! One [`Secret`] exists per conversation. It is generated once by whichever
//! participant wins the escrow race and never rotated afterwards.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CoreError;

/// Length of a conversation secret in bytes.
pub const SECRET_LEN: usize = 32;

/// A 256-bit symmetric conversation secret.
///
/// The bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    /// Generate a fresh secret from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly [`SECRET_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; SECRET_LEN] = bytes.try_into().map_err(|_| {
            CoreError::InvalidSecret(format!(
                "expected {} bytes, got {}",
                SECRET_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Standard base64 (with padding), the form kept in the local cache.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse the base64 cache form.
    pub fn from_base64(encoded: &str) -> Result<Self, CoreError> {
        let mut bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CoreError::InvalidSecret(e.to_string()))?;
        let secret = Self::from_slice(&bytes);
        bytes.zeroize();
        secret
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}
