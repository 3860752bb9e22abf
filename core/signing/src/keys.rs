//! Signing key types with secure memory handling.
//!
//! Key material zeroizes on drop and never appears in debug output.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use filestore_common::{Error, Result};

use crate::window::AccessWindow;

/// Symmetric key used to sign capability URLs.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    /// Create a key from raw bytes.
    ///
    /// # Errors
    /// - Returns error if `bytes` is empty
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::Configuration("Signing key cannot be empty".to_string()));
        }
        Ok(Self { bytes })
    }

    /// Decode a base64 account key as found in connection strings.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Configuration(format!("Account key is not valid base64: {}", e)))?;
        Self::from_bytes(bytes)
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

/// Short-lived signing key issued by the backend for a specific window.
#[derive(Debug, Clone)]
pub struct DelegationKey {
    /// Identity of the principal the key was issued to.
    pub object_id: String,
    /// Window during which the key may sign.
    pub window: AccessWindow,
    /// Key material.
    pub key: SigningKey,
}
