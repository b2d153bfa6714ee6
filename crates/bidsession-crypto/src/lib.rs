//! Session exchange cryptographic primitives
//!
//! Key agreement and authenticated encryption used by every request of the
//! session exchange protocol. Functions are synchronous and pure: nonces are
//! supplied by the caller so envelopes can be reproduced in tests.
//!
//! # Key Flow
//!
//! ```text
//! Local secret key ─┐
//!                   ├─ ECDH (secp256k1) ─ HKDF-SHA256 ─ SharedKey
//! Remote public key ┘                                      │
//!                                                          ▼
//!                               XChaCha20-Poly1305 ─ nonce || ciphertext || tag
//!                                                          │
//!                                                          ▼
//!                                                     base64 text
//! ```
//!
//! Both parties of an exchange derive the same [`SharedKey`] from
//! complementary key pairs. A shared key lives for one call (or one session)
//! and is zeroized on drop.
//!
//! # Security
//!
//! - Points off the curve and malformed keys are rejected before agreement
//! - Ciphertexts are self-describing: the 24-byte nonce travels in front
//! - Any tag mismatch, truncation, or wrong key fails decryption as a whole;
//!   no partial plaintext is ever returned

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aead;
mod error;
mod key_agreement;

pub use aead::{
    Ciphertext, NONCE_SIZE, TAG_SIZE, decrypt, decrypt_from_base64, encrypt, encrypt_to_base64,
};
pub use error::CryptoError;
pub use key_agreement::{
    KeyPair, SHARED_KEY_SIZE, SharedKey, derive_shared_key, derive_shared_key_from_base64,
    parse_public_key,
};
