// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kyber-1024 key encapsulation, the post-quantum half of the handshake.
//!
//! Key material is carried as opaque bytes and only parsed when an operation actually needs the
//! key. A record holding a corrupted key therefore deserializes fine and fails at use, which is
//! the contract the pre-key records build on.
use std::fmt;

use pqcrypto_kyber::kyber1024;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::Secret;

/// Size of the shared secret produced by encapsulation.
pub const KEM_SHARED_SECRET_SIZE: usize = 32;

/// Kyber-1024 public key, held as opaque bytes until used.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemPublicKey(#[serde(with = "serde_bytes")] Vec<u8>);

impl KemPublicKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn parse(&self) -> Result<kyber1024::PublicKey, KemError> {
        kyber1024::PublicKey::from_bytes(&self.0).map_err(|_| KemError::InvalidPublicKey)
    }
}

impl fmt::Debug for KemPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemPublicKey({}..)", hex::encode(&self.0[..self.0.len().min(8)]))
    }
}

/// Kyber-1024 secret key, held as opaque bytes until used and zeroised on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KemSecretKey(#[serde(with = "serde_bytes")] Vec<u8>);

impl KemSecretKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn parse(&self) -> Result<kyber1024::SecretKey, KemError> {
        kyber1024::SecretKey::from_bytes(&self.0).map_err(|_| KemError::InvalidSecretKey)
    }
}

impl PartialEq for KemSecretKey {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison.
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for KemSecretKey {}

impl fmt::Debug for KemSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not reveal secret values when printing debug info.
        f.debug_struct("KemSecretKey").field("value", &"***").finish()
    }
}

/// Encapsulation ciphertext sent to the key owner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemCiphertext(#[serde(with = "serde_bytes")] Vec<u8>);

impl KemCiphertext {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KemCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemCiphertext({} bytes)", self.0.len())
    }
}

/// Kyber-1024 key pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemKeyPair {
    secret_key: KemSecretKey,
    public_key: KemPublicKey,
}

impl KemKeyPair {
    pub fn new(secret_key: KemSecretKey, public_key: KemPublicKey) -> Self {
        Self {
            secret_key,
            public_key,
        }
    }

    /// Generates a fresh Kyber-1024 key pair.
    ///
    /// The underlying implementation draws its own operating-system randomness; unlike the
    /// X25519 key generation this cannot be seeded.
    pub fn generate() -> Self {
        let (public_key, secret_key) = kyber1024::keypair();
        Self {
            secret_key: KemSecretKey(secret_key.as_bytes().to_vec()),
            public_key: KemPublicKey(public_key.as_bytes().to_vec()),
        }
    }

    pub fn secret_key(&self) -> &KemSecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> &KemPublicKey {
        &self.public_key
    }
}

/// Encapsulates a fresh shared secret to the owner of `public_key`.
pub fn kem_encapsulate(
    public_key: &KemPublicKey,
) -> Result<(KemCiphertext, Secret<KEM_SHARED_SECRET_SIZE>), KemError> {
    let public_key = public_key.parse()?;
    let (shared_secret, ciphertext) = kyber1024::encapsulate(&public_key);
    let shared_secret: [u8; KEM_SHARED_SECRET_SIZE] = shared_secret
        .as_bytes()
        .try_into()
        .expect("kyber shared secret size");
    Ok((
        KemCiphertext(ciphertext.as_bytes().to_vec()),
        Secret::from_bytes(shared_secret),
    ))
}

/// Recovers the shared secret from `ciphertext` with our secret key.
pub fn kem_decapsulate(
    secret_key: &KemSecretKey,
    ciphertext: &KemCiphertext,
) -> Result<Secret<KEM_SHARED_SECRET_SIZE>, KemError> {
    let secret_key = secret_key.parse()?;
    let ciphertext =
        kyber1024::Ciphertext::from_bytes(&ciphertext.0).map_err(|_| KemError::InvalidCiphertext)?;
    let shared_secret = kyber1024::decapsulate(&ciphertext, &secret_key);
    let shared_secret: [u8; KEM_SHARED_SECRET_SIZE] = shared_secret
        .as_bytes()
        .try_into()
        .expect("kyber shared secret size");
    Ok(Secret::from_bytes(shared_secret))
}

#[derive(Debug, Error)]
pub enum KemError {
    #[error("kem public key is malformed")]
    InvalidPublicKey,

    #[error("kem secret key is malformed")]
    InvalidSecretKey,

    #[error("kem ciphertext is malformed")]
    InvalidCiphertext,
}
