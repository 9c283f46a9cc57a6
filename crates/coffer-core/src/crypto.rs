// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Password-based encryption of backup payloads.
//!
//! Payloads are sealed with AES-256-GCM under a key derived from the caller-supplied
//! password via PBKDF2-HMAC-SHA256. The envelope is self-describing:
//!
//! ```text
//! salt (32 bytes) || nonce (12 bytes) || ciphertext with GCM tag
//! ```
//!
//! Salt and nonce are drawn freshly from the OS RNG for every encryption, so any holder
//! of the correct password can decrypt without external key material. The PBKDF2
//! iteration count is not encoded in the envelope; encrypting and decrypting deployments
//! must agree on it.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

/// Size of the random salt prefixed to the envelope.
pub const SALT_SIZE: usize = 32;
/// Size of the AES-GCM nonce.
pub const NONCE_SIZE: usize = 12;
/// Size of the derived AES-256 key.
const KEY_SIZE: usize = 32;
/// The smallest well-formed envelope: salt, nonce, and at least one ciphertext byte.
pub const MIN_ENVELOPE_SIZE: usize = SALT_SIZE + NONCE_SIZE + 1;

/// The PBKDF2-HMAC-SHA256 iteration count used unless a deployment overrides it.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Errors arising from envelope encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The OS RNG failed to produce the salt or nonce.
    #[error("generate random bytes: {0}")]
    Rng(#[from] rand::Error),
    /// The ciphertext could not be produced.
    #[error("seal payload")]
    Seal,
    /// The envelope is shorter than [`MIN_ENVELOPE_SIZE`].
    #[error("encrypted data too short")]
    Truncated,
    /// The GCM tag did not verify.
    #[error("decryption failed (wrong password or corrupted data)")]
    WrongPassword,
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Encrypts `plaintext` with a key derived from `password`.
///
/// Returns the self-describing envelope. Fails only if the OS RNG cannot produce the
/// salt or nonce. Callers are responsible for rejecting empty passwords; this primitive
/// treats them like any other password.
pub fn encrypt_with_password(
    plaintext: &[u8],
    password: &str,
    iterations: u32,
) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.try_fill_bytes(&mut salt)?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.try_fill_bytes(&mut nonce_bytes)?;

    let key = derive_key(password, &salt, iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::Seal)?;

    let mut envelope = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypts an envelope produced by [`encrypt_with_password`].
///
/// Fails with [`CryptoError::Truncated`] if the envelope cannot contain a salt, nonce,
/// and ciphertext, and with [`CryptoError::WrongPassword`] on any GCM tag mismatch. The
/// two cases are indistinguishable to an attacker holding a corrupted envelope.
pub fn decrypt_with_password(
    envelope: &[u8],
    password: &str,
    iterations: u32,
) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < MIN_ENVELOPE_SIZE {
        return Err(CryptoError::Truncated);
    }

    let (salt, remainder) = envelope.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = remainder.split_at(NONCE_SIZE);

    let key = derive_key(password, salt, iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::WrongPassword)
}

#[cfg(test)]
mod tests {
    use coffer_test_utils::param_test;

    use super::*;

    // Keep unit tests fast; the default count is exercised once below.
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn round_trip_recovers_plaintext() {
        let plaintext = b"{\"users\":[]}";
        let envelope = encrypt_with_password(plaintext, "secret", TEST_ITERATIONS).unwrap();
        assert_eq!(envelope.len(), SALT_SIZE + NONCE_SIZE + plaintext.len() + 16);
        let recovered = decrypt_with_password(&envelope, "secret", TEST_ITERATIONS).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn round_trip_with_default_iterations() {
        let envelope =
            encrypt_with_password(b"{}", "secret", DEFAULT_PBKDF2_ITERATIONS).unwrap();
        let recovered =
            decrypt_with_password(&envelope, "secret", DEFAULT_PBKDF2_ITERATIONS).unwrap();
        assert_eq!(recovered, b"{}");
    }

    #[test]
    fn wrong_password_is_rejected() {
        let envelope = encrypt_with_password(b"payload", "secret", TEST_ITERATIONS).unwrap();
        let error = decrypt_with_password(&envelope, "wrong", TEST_ITERATIONS).unwrap_err();
        assert!(matches!(error, CryptoError::WrongPassword));
    }

    #[test]
    fn empty_password_round_trips_but_does_not_match_others() {
        let envelope = encrypt_with_password(b"payload", "", TEST_ITERATIONS).unwrap();
        assert_eq!(
            decrypt_with_password(&envelope, "", TEST_ITERATIONS).unwrap(),
            b"payload"
        );
        assert!(matches!(
            decrypt_with_password(&envelope, "secret", TEST_ITERATIONS),
            Err(CryptoError::WrongPassword)
        ));
    }

    #[test]
    fn corrupted_ciphertext_is_rejected() {
        let mut envelope = encrypt_with_password(b"payload", "secret", TEST_ITERATIONS).unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        assert!(matches!(
            decrypt_with_password(&envelope, "secret", TEST_ITERATIONS),
            Err(CryptoError::WrongPassword)
        ));
    }

    param_test! {
        truncated_envelopes_are_rejected: [
            empty: (0),
            salt_only: (SALT_SIZE),
            one_short_of_minimum: (MIN_ENVELOPE_SIZE - 1),
        ]
    }
    fn truncated_envelopes_are_rejected(len: usize) {
        let envelope = vec![0u8; len];
        assert!(matches!(
            decrypt_with_password(&envelope, "secret", TEST_ITERATIONS),
            Err(CryptoError::Truncated)
        ));
    }

    #[test]
    fn salts_and_nonces_are_fresh_per_encryption() {
        let first = encrypt_with_password(b"payload", "secret", TEST_ITERATIONS).unwrap();
        let second = encrypt_with_password(b"payload", "secret", TEST_ITERATIONS).unwrap();
        assert_ne!(first[..SALT_SIZE], second[..SALT_SIZE]);
        assert_ne!(
            first[SALT_SIZE..SALT_SIZE + NONCE_SIZE],
            second[SALT_SIZE..SALT_SIZE + NONCE_SIZE]
        );
    }
}
