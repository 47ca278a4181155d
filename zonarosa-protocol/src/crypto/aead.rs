// SPDX-License-Identifier: MIT OR Apache-2.0

//! XChaCha20-Poly1305 authenticated encryption.
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{KeyInit, XChaCha20Poly1305, XNonce};
use thiserror::Error;

/// 256-bit AEAD key.
pub const AEAD_KEY_SIZE: usize = 32;

/// 192-bit XChaCha20 nonce.
pub const AEAD_NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag appended to every ciphertext.
pub const AEAD_TAG_SIZE: usize = 16;

/// Encrypts `plaintext` and authenticates it together with the additional data `aad`.
///
/// Message keys in this crate are derived for exactly one encryption, with the nonce derived
/// alongside the key, so a (key, nonce) pair is never reused.
pub fn aead_encrypt(
    key: &[u8; AEAD_KEY_SIZE],
    nonce: &[u8; AEAD_NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| AeadError::InvalidKeySize)?;
    cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| AeadError::Encrypt)
}

/// Decrypts `ciphertext` and verifies its authentication tag against `aad`.
///
/// A failed tag check does not reveal whether the key, the nonce, the ciphertext or the
/// additional data was wrong.
pub fn aead_decrypt(
    key: &[u8; AEAD_KEY_SIZE],
    nonce: &[u8; AEAD_NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| AeadError::InvalidKeySize)?;
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| AeadError::Decrypt)
}

#[derive(Debug, Error)]
pub enum AeadError {
    #[error("invalid aead key size")]
    InvalidKeySize,

    #[error("plaintext could not be encrypted")]
    Encrypt,

    #[error("ciphertext failed authentication")]
    Decrypt,
}
