// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::Rng;
use crate::crypto::kem::{KemKeyPair, KemPublicKey, KemSecretKey};
use crate::crypto::xeddsa::{XEdDSAError, XSignature};
use crate::identity::IdentityKeyPair;
use crate::keys::{KeyRecordError, KyberPreKeyId};

/// Kyber pre-key record, the post-quantum analogue of the signed pre-key.
///
/// Rotated periodically; a "last resort" record may be reused across handshakes, which is why
/// the store tracks which `(kyber id, signed pre-key id)` pairs have been consumed by which
/// base key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KyberPreKeyRecord {
    id: KyberPreKeyId,
    timestamp_ms: u64,
    public_key: KemPublicKey,
    signature: XSignature,
    secret: KemSecretKey,
}

impl KyberPreKeyRecord {
    pub fn generate(
        id: KyberPreKeyId,
        identity: &IdentityKeyPair,
        timestamp_ms: u64,
        rng: &Rng,
    ) -> Result<Self, XEdDSAError> {
        let key_pair = KemKeyPair::generate();
        let signature = identity.sign(key_pair.public_key().as_bytes(), rng)?;
        Ok(Self {
            id,
            timestamp_ms,
            public_key: key_pair.public_key().clone(),
            signature,
            secret: key_pair.secret_key().clone(),
        })
    }

    pub fn id(&self) -> KyberPreKeyId {
        self.id
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn public_key(&self) -> &KemPublicKey {
        &self.public_key
    }

    pub fn signature(&self) -> &XSignature {
        &self.signature
    }

    /// Parses the stored key material into a usable key pair; see [`crate::keys`] on lazy
    /// validation.
    pub fn key_pair(&self) -> Result<KemKeyPair, KeyRecordError> {
        self.secret
            .parse()
            .map_err(|_| KeyRecordError::InvalidKeyMaterial)?;
        self.public_key
            .parse()
            .map_err(|_| KeyRecordError::InvalidKeyMaterial)?;
        Ok(KemKeyPair::new(
            self.secret.clone(),
            self.public_key.clone(),
        ))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}
