// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::x25519::{KeyPair, PublicKey, SECRET_KEY_SIZE, SecretKey};
use crate::crypto::{Rng, RngError};
use crate::keys::{KeyRecordError, PreKeyId};

/// One-time pre-key record.
///
/// Published once, consumed by exactly one incoming handshake, then removed from the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyRecord {
    id: PreKeyId,
    public_key: PublicKey,
    secret: OpaqueSecret,
}

impl PreKeyRecord {
    pub fn generate(id: PreKeyId, rng: &Rng) -> Result<Self, RngError> {
        Ok(Self::new(id, &KeyPair::generate(rng)?))
    }

    pub fn new(id: PreKeyId, key_pair: &KeyPair) -> Self {
        Self {
            id,
            public_key: *key_pair.public_key(),
            secret: OpaqueSecret(key_pair.secret_key().as_bytes().to_vec()),
        }
    }

    pub fn id(&self) -> PreKeyId {
        self.id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Parses the stored key material into a usable key pair.
    ///
    /// This is where key validity surfaces; construction and deserialization only check
    /// structure.
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

/// Secret half of a record, kept opaque until the key pair is accessed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct OpaqueSecret(#[serde(with = "serde_bytes")] pub(crate) Vec<u8>);

impl std::fmt::Debug for OpaqueSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not reveal secret values when printing debug info.
        f.debug_struct("OpaqueSecret").field("value", &"***").finish()
    }
}
