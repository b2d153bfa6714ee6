//! secp256k1 key pairs and shared-key derivation

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hkdf::Hkdf;
use k256::{PublicKey, SecretKey, ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Size of a derived shared key in bytes
pub const SHARED_KEY_SIZE: usize = 32;

/// Size of a secp256k1 secret scalar in bytes
const SECRET_KEY_SIZE: usize = 32;

/// Label used for shared key derivation
const SHARED_KEY_LABEL: &[u8] = b"bidsession shared key v1";

/// SEC1 tag for an uncompressed point
const UNCOMPRESSED_TAG: u8 = 0x04;

/// Process-wide asymmetric identity.
///
/// Loaded once at startup and shared read-only (`Arc<KeyPair>`). The public
/// half is sent in cleartext with every request; the secret half never leaves
/// this struct except through [`KeyPair::secret_key_base64`].
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from a 32-byte secret scalar.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: the scalar is zero or not below the curve order
    pub fn from_secret_bytes(bytes: &[u8; SECRET_KEY_SIZE]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|_| CryptoError::InvalidKey { reason: "secret scalar out of range".into() })?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    /// Build a key pair from a base64-encoded 32-byte secret scalar.
    pub fn from_base64(secret_b64: &str) -> Result<Self, CryptoError> {
        let mut bytes = BASE64
            .decode(secret_b64.trim())
            .map_err(|e| CryptoError::InvalidKey { reason: format!("secret key base64: {e}") })?;

        let result = match <[u8; SECRET_KEY_SIZE]>::try_from(bytes.as_slice()) {
            Ok(scalar) => Self::from_secret_bytes(&scalar),
            Err(_) => Err(CryptoError::InvalidKey {
                reason: format!("secret key must be {SECRET_KEY_SIZE} bytes, got {}", bytes.len()),
            }),
        };
        bytes.zeroize();
        result
    }

    /// Secret half, used for agreement.
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Public key in the service's wire format: base64 of the 64-byte
    /// uncompressed point without the SEC1 tag.
    pub fn public_key_base64(&self) -> String {
        encode_public_key(&self.public)
    }

    /// Secret scalar as base64.
    pub fn secret_key_base64(&self) -> String {
        let mut bytes = self.secret.to_bytes();
        let encoded = BASE64.encode(bytes.as_slice());
        bytes.as_mut_slice().zeroize();
        encoded
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public_key_base64()).finish_non_exhaustive()
    }
}

/// Symmetric key derived from a (local secret, remote public) pair.
///
/// Recomputed per call, never persisted. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey {
    key: [u8; SHARED_KEY_SIZE],
}

impl SharedKey {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength`: `bytes` is not 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = <[u8; SHARED_KEY_SIZE]>::try_from(bytes).map_err(|_| {
            CryptoError::InvalidKeyLength { expected: SHARED_KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self { key })
    }

    /// 32-byte key for XChaCha20-Poly1305.
    pub fn as_bytes(&self) -> &[u8; SHARED_KEY_SIZE] {
        &self.key
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Derive the shared key for a local secret and a remote public key.
///
/// ```text
/// ikm  = x-coordinate of ECDH(local_secret, remote_public)
/// key  = HKDF-SHA256(salt = none, ikm, info = "bidsession shared key v1")
/// ```
///
/// Deterministic, and symmetric across complementary key pairs.
pub fn derive_shared_key(local_secret: &SecretKey, remote_public: &PublicKey) -> SharedKey {
    let shared = diffie_hellman(local_secret.to_nonzero_scalar(), remote_public.as_affine());
    let hkdf = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes().as_slice());

    let mut key = [0u8; SHARED_KEY_SIZE];
    let Ok(()) = hkdf.expand(SHARED_KEY_LABEL, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    SharedKey { key }
}

/// Parse the remote public key from its text form, then derive.
///
/// # Errors
///
/// - `InvalidKey`: the public key is malformed or not on the curve
pub fn derive_shared_key_from_base64(
    local_secret: &SecretKey,
    remote_public_b64: &str,
) -> Result<SharedKey, CryptoError> {
    let remote_public = parse_public_key(remote_public_b64)?;
    Ok(derive_shared_key(local_secret, &remote_public))
}

/// Parse a base64 public key.
///
/// Accepts the 64-byte raw `X || Y` form published by the service, the
/// 65-byte SEC1 uncompressed form, and the 33-byte SEC1 compressed form.
pub fn parse_public_key(public_b64: &str) -> Result<PublicKey, CryptoError> {
    let bytes = BASE64
        .decode(public_b64.trim())
        .map_err(|e| CryptoError::InvalidKey { reason: format!("public key base64: {e}") })?;

    let sec1 = if bytes.len() == 64 {
        let mut tagged = Vec::with_capacity(65);
        tagged.push(UNCOMPRESSED_TAG);
        tagged.extend_from_slice(&bytes);
        tagged
    } else {
        bytes
    };

    PublicKey::from_sec1_bytes(&sec1).map_err(|_| CryptoError::InvalidKey {
        reason: format!("{} bytes is not a valid secp256k1 point", sec1.len()),
    })
}

fn encode_public_key(public: &PublicKey) -> String {
    let point = public.to_encoded_point(false);
    // Drop the SEC1 tag byte
    BASE64.encode(&point.as_bytes()[1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> KeyPair {
        KeyPair::from_secret_bytes(&[0x11; 32]).unwrap()
    }

    fn bob() -> KeyPair {
        KeyPair::from_secret_bytes(&[0x22; 32]).unwrap()
    }

    #[test]
    fn agreement_is_symmetric() {
        let (a, b) = (alice(), bob());

        let ab = derive_shared_key(a.secret(), b.public());
        let ba = derive_shared_key(b.secret(), a.public());

        assert_eq!(ab, ba, "both sides must derive identical key bytes");
    }

    #[test]
    fn agreement_is_deterministic() {
        let (a, b) = (alice(), bob());

        let k1 = derive_shared_key(a.secret(), b.public());
        let k2 = derive_shared_key(a.secret(), b.public());

        assert_eq!(k1, k2);
    }

    #[test]
    fn different_peers_produce_different_keys() {
        let carol = KeyPair::from_secret_bytes(&[0x33; 32]).unwrap();
        let a = alice();

        let with_bob = derive_shared_key(a.secret(), bob().public());
        let with_carol = derive_shared_key(a.secret(), carol.public());

        assert_ne!(with_bob, with_carol);
    }

    #[test]
    fn public_key_text_form_is_64_raw_bytes() {
        let encoded = alice().public_key_base64();
        let raw = BASE64.decode(&encoded).unwrap();
        assert_eq!(raw.len(), 64);
    }

    #[test]
    fn public_key_roundtrips_through_text() {
        let a = alice();
        let parsed = parse_public_key(&a.public_key_base64()).unwrap();
        assert_eq!(&parsed, a.public());
    }

    #[test]
    fn parse_accepts_sec1_forms() {
        let a = alice();
        let uncompressed = BASE64.encode(a.public().to_encoded_point(false).as_bytes());
        let compressed = BASE64.encode(a.public().to_encoded_point(true).as_bytes());

        assert_eq!(&parse_public_key(&uncompressed).unwrap(), a.public());
        assert_eq!(&parse_public_key(&compressed).unwrap(), a.public());
    }

    #[test]
    fn base64_derivation_matches_typed_derivation() {
        let (a, b) = (alice(), bob());

        let typed = derive_shared_key(a.secret(), b.public());
        let text = derive_shared_key_from_base64(a.secret(), &b.public_key_base64()).unwrap();

        assert_eq!(typed, text);
    }

    #[test]
    fn malformed_public_key_is_rejected() {
        let a = alice();

        let not_base64 = derive_shared_key_from_base64(a.secret(), "not base64!");
        assert!(matches!(not_base64, Err(CryptoError::InvalidKey { .. })));

        let wrong_length = derive_shared_key_from_base64(a.secret(), &BASE64.encode([7u8; 20]));
        assert!(matches!(wrong_length, Err(CryptoError::InvalidKey { .. })));
    }

    #[test]
    fn point_off_curve_is_rejected() {
        // (0, 1) does not satisfy y^2 = x^3 + 7
        let mut raw = [0u8; 64];
        raw[63] = 1;
        let result = parse_public_key(&BASE64.encode(raw));
        assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));
    }

    #[test]
    fn zero_secret_is_rejected() {
        let result = KeyPair::from_secret_bytes(&[0u8; 32]);
        assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));
    }

    #[test]
    fn secret_above_curve_order_is_rejected() {
        let result = KeyPair::from_secret_bytes(&[0xFF; 32]);
        assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));
    }

    #[test]
    fn secret_key_roundtrips_through_base64() {
        let a = alice();
        let restored = KeyPair::from_base64(&a.secret_key_base64()).unwrap();
        assert_eq!(restored.public_key_base64(), a.public_key_base64());
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = KeyPair::from_base64(&BASE64.encode([0x11u8; 16]));
        assert!(matches!(result, Err(CryptoError::InvalidKey { reason }) if reason.contains("32")));
    }

    #[test]
    fn shared_key_from_slice_checks_length() {
        assert!(SharedKey::from_slice(&[0u8; 32]).is_ok());
        assert_eq!(
            SharedKey::from_slice(&[0u8; 31]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
        );
    }

    #[test]
    fn debug_does_not_leak_secrets() {
        let a = alice();
        let rendered = format!("{a:?}");
        assert!(!rendered.contains(&a.secret_key_base64()));

        let key = derive_shared_key(a.secret(), bob().public());
        assert_eq!(format!("{key:?}"), "SharedKey(..)");
    }
}
