//! Fuzz target for untrusted session responses
//!
//! Everything a poll response carries is attacker-controlled: the declared
//! counterpart public key and the encrypted `data` field.
//!
//! # Strategy
//!
//! - Arbitrary public key text: base64 noise, wrong lengths, off-curve points
//! - Arbitrary ciphertext text: truncated, non-base64, random bytes
//! - Bit flips in a genuine ciphertext under a genuine key
//!
//! # Invariants
//!
//! - NEVER panic on malformed keys or ciphertexts
//! - A flipped bit never decrypts
//! - Nothing but a genuine ciphertext yields plaintext

#![no_main]

use arbitrary::Arbitrary;
use bidsession_client::envelope::open_json;
use bidsession_crypto::{
    Ciphertext, KeyPair, decrypt_from_base64, derive_shared_key, derive_shared_key_from_base64,
    encrypt,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    /// Counterpart key and ciphertext straight from the wire
    Raw { public_key: String, data: String },
    /// Genuine ciphertext with one bit flipped
    BitFlip { plaintext: Vec<u8>, nonce: [u8; 24], position: usize, bit: u8 },
}

fuzz_target!(|input: Input| {
    let Ok(local) = KeyPair::from_secret_bytes(&[0x11; 32]) else {
        return;
    };

    match input {
        Input::Raw { public_key, data } => {
            let Ok(key) = derive_shared_key_from_base64(local.secret(), &public_key) else {
                return;
            };
            let _ = decrypt_from_base64(&data, &key);
            let _ = open_json::<serde_json::Value>(&data, &key);
        },
        Input::BitFlip { plaintext, nonce, position, bit } => {
            let Ok(remote) = KeyPair::from_secret_bytes(&[0x22; 32]) else {
                return;
            };
            let key = derive_shared_key(local.secret(), remote.public());
            let Ok(sealed) = encrypt(&plaintext, &key, nonce) else {
                return;
            };

            let mut bytes = sealed.as_bytes().to_vec();
            let index = position % bytes.len();
            bytes[index] ^= 1 << (bit % 8);

            let tampered = Ciphertext::from_bytes(bytes).to_base64();
            assert!(decrypt_from_base64(&tampered, &key).is_err(), "tampered ciphertext decrypted");
        },
    }
});
