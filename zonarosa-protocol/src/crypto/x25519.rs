// SPDX-License-Identifier: MIT OR Apache-2.0

//! X25519 elliptic-curve Diffie-Hellman key agreement.
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::StaticSecret;

use crate::crypto::{Rng, RngError, Secret};

pub const PUBLIC_KEY_SIZE: usize = 32;

pub const SECRET_KEY_SIZE: usize = 32;

/// X25519 secret key.
///
/// Identity keys, signed pre-keys and ratchet keys are all X25519 secrets; signatures over them
/// use the XEdDSA scheme so one key pair serves both Diffie-Hellman and signing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey(Secret<SECRET_KEY_SIZE>);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(Secret::from_bytes(bytes))
    }

    pub fn generate(rng: &Rng) -> Result<Self, RngError> {
        Ok(Self::from_bytes(rng.random_array()?))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        self.0.as_bytes()
    }

    /// Derives the public counterpart of this secret key.
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(*self.0.as_bytes());
        PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes())
    }

    /// Computes the shared secret between our secret key and their public key.
    ///
    /// Rejects agreements where the peer's public key is a low-order point, which would yield a
    /// shared secret an attacker can predict without knowing any secret key.
    pub fn calculate_agreement(
        &self,
        their_public_key: &PublicKey,
    ) -> Result<Secret<32>, X25519Error> {
        let secret = StaticSecret::from(*self.0.as_bytes());
        let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(their_public_key.0));
        if !shared.was_contributory() {
            return Err(X25519Error::NonContributory);
        }
        Ok(Secret::from_bytes(*shared.as_bytes()))
    }
}

/// X25519 public key.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "serde_bytes")] [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = X25519Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| X25519Error::InvalidKeyLength {
                    expected: PUBLIC_KEY_SIZE,
                    got: bytes.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// X25519 key pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    pub fn generate(rng: &Rng) -> Result<Self, RngError> {
        Ok(Self::from_secret(SecretKey::generate(rng)?))
    }

    pub fn from_secret(secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key();
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

#[derive(Debug, Error)]
pub enum X25519Error {
    #[error("peer public key is a low-order point")]
    NonContributory,

    #[error("invalid public key length, expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}
