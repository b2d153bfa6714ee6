//! Payload encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - the nonce must be provided by the caller.
//! Ciphertexts carry their nonce, so [`decrypt`] needs nothing but the key.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CryptoError, key_agreement::SharedKey};

/// Size of the `XChaCha20` nonce (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Self-describing ciphertext.
///
/// Layout:
/// - bytes 0-23: nonce
/// - bytes 24..: ciphertext including 16-byte Poly1305 tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    bytes: Vec<u8>,
}

impl Ciphertext {
    /// Wrap raw ciphertext bytes received from a peer.
    ///
    /// No validation happens here; [`decrypt`] rejects malformed input.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Decode the base64 text form.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        BASE64
            .decode(text.trim())
            .map(Self::from_bytes)
            .map_err(|e| CryptoError::Decryption { reason: format!("malformed base64: {e}") })
    }

    /// Base64 text form used on the wire.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Raw bytes (nonce followed by sealed data).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Plaintext length (total minus nonce and authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.bytes.len().saturating_sub(NONCE_SIZE + TAG_SIZE)
    }
}

/// Encrypt a payload under a shared key.
///
/// # Security
///
/// - Caller MUST provide a fresh, cryptographically random nonce per call
/// - 24-byte nonces make random generation collision-safe
///
/// # Errors
///
/// - `Encryption`: the AEAD rejected the input
pub fn encrypt(
    plaintext: &[u8],
    key: &SharedKey,
    nonce: [u8; NONCE_SIZE],
) -> Result<Ciphertext, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption { reason: "AEAD seal failed".to_string() })?;

    let mut bytes = Vec::with_capacity(NONCE_SIZE + sealed.len());
    bytes.extend_from_slice(&nonce);
    bytes.extend_from_slice(&sealed);

    Ok(Ciphertext { bytes })
}

/// Decrypt a ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// - `Decryption`: input shorter than nonce + tag, authentication tag
///   mismatch (tampering), or wrong key
pub fn decrypt(ciphertext: &Ciphertext, key: &SharedKey) -> Result<Vec<u8>, CryptoError> {
    let bytes = ciphertext.as_bytes();
    if bytes.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption {
            reason: format!(
                "ciphertext too short: {} bytes, need at least {}",
                bytes.len(),
                NONCE_SIZE + TAG_SIZE
            ),
        });
    }

    let (nonce, sealed) = bytes.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decryption { reason: "authentication failed".to_string() })
}

/// Encrypt and return the base64 text form.
pub fn encrypt_to_base64(
    plaintext: &[u8],
    key: &SharedKey,
    nonce: [u8; NONCE_SIZE],
) -> Result<String, CryptoError> {
    encrypt(plaintext, key, nonce).map(|c| c.to_base64())
}

/// Decode base64 text and decrypt.
pub fn decrypt_from_base64(text: &str, key: &SharedKey) -> Result<Vec<u8>, CryptoError> {
    decrypt(&Ciphertext::from_base64(text)?, key)
}
