// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term identity keys.
//!
//! The public half is distributed to other users through pre-key bundles and certificates; the
//! secret half never leaves the owning device. The same X25519 pair performs key agreement in
//! the handshake and XEdDSA signing of published pre-keys.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::x25519::{KeyPair, PublicKey, SecretKey};
use crate::crypto::xeddsa::{XEdDSAError, XSignature, xeddsa_sign, xeddsa_verify};
use crate::crypto::{Rng, RngError};

/// Public identity key of a device.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(PublicKey);

impl IdentityKey {
    pub fn new(public_key: PublicKey) -> Self {
        Self(public_key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    /// Verifies an XEdDSA signature issued by the owner of this identity.
    pub fn verify_signature(&self, bytes: &[u8], signature: &XSignature) -> Result<(), XEdDSAError> {
        xeddsa_verify(bytes, &self.0, signature)
    }
}

impl From<PublicKey> for IdentityKey {
    fn from(public_key: PublicKey) -> Self {
        Self(public_key)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({})", self.0.to_hex())
    }
}

/// Identity key pair of the local device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKeyPair {
    identity_key: IdentityKey,
    secret_key: SecretKey,
}

impl IdentityKeyPair {
    pub fn generate(rng: &Rng) -> Result<Self, RngError> {
        Ok(Self::from(KeyPair::generate(rng)?))
    }

    pub fn new(identity_key: IdentityKey, secret_key: SecretKey) -> Self {
        Self {
            identity_key,
            secret_key,
        }
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    pub fn public_key(&self) -> &PublicKey {
        self.identity_key.public_key()
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Signs published key material (pre-keys, certificates) with the identity secret.
    pub fn sign(&self, bytes: &[u8], rng: &Rng) -> Result<XSignature, XEdDSAError> {
        xeddsa_sign(bytes, &self.secret_key, rng)
    }
}

impl From<KeyPair> for IdentityKeyPair {
    fn from(key_pair: KeyPair) -> Self {
        Self {
            identity_key: IdentityKey::new(*key_pair.public_key()),
            secret_key: key_pair.secret_key().clone(),
        }
    }
}
