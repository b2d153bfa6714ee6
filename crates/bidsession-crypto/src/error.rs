//! Error types for key agreement and envelope encryption

use thiserror::Error;

/// Errors from cryptographic operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key material is malformed or not a valid secp256k1 key
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Symmetric key has the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Encryption failed
    #[error("encryption failed: {reason}")]
    Encryption {
        /// Reason for encryption failure
        reason: String,
    },

    /// Decryption failed (tag mismatch, malformed input, or wrong key)
    #[error("decryption failed: {reason}")]
    Decryption {
        /// Reason for decryption failure
        reason: String,
    },
}

impl CryptoError {
    /// Returns true if the error came from untrusted input rather than local
    /// key material.
    ///
    /// A decryption failure means the counterpart sent something we must not
    /// trust. The other variants point at our own configuration.
    pub fn is_untrusted_input(&self) -> bool {
        matches!(self, Self::Decryption { .. })
    }
}
