// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::Rng;
use crate::crypto::x25519::{KeyPair, PublicKey, SECRET_KEY_SIZE, SecretKey};
use crate::crypto::xeddsa::{XEdDSAError, XSignature};
use crate::identity::IdentityKeyPair;
use crate::keys::prekey::OpaqueSecret;
use crate::keys::{KeyRecordError, SignedPreKeyId};

/// Signed pre-key record.
///
/// Rotated periodically by the owning device; the signature binds the pre-key to the identity
/// key so a bundle cannot substitute an attacker's key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKeyRecord {
    id: SignedPreKeyId,
    timestamp_ms: u64,
    public_key: PublicKey,
    signature: XSignature,
    secret: OpaqueSecret,
}

impl SignedPreKeyRecord {
    pub fn generate(
        id: SignedPreKeyId,
        identity: &IdentityKeyPair,
        timestamp_ms: u64,
        rng: &Rng,
    ) -> Result<Self, XEdDSAError> {
        let key_pair = KeyPair::generate(rng)?;
        let signature = identity.sign(key_pair.public_key().as_bytes(), rng)?;
        Ok(Self {
            id,
            timestamp_ms,
            public_key: *key_pair.public_key(),
            signature,
            secret: OpaqueSecret(key_pair.secret_key().as_bytes().to_vec()),
        })
    }

    pub fn id(&self) -> SignedPreKeyId {
        self.id
    }

    /// Creation time, used by the owning device to decide when to rotate.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn signature(&self) -> &XSignature {
        &self.signature
    }

    /// Parses the stored key material into a usable key pair; see [`crate::keys`] on lazy
    /// validation.
    pub fn key_pair(&self) -> Result<KeyPair, KeyRecordError> {
        let bytes: [u8; SECRET_KEY_SIZE] = self
            .secret
            .0
            .as_slice()
            .try_into()
            .map_err(|_| KeyRecordError::InvalidKeyMaterial)?;
        Ok(KeyPair::from_secret(SecretKey::from_bytes(bytes)))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}
