// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender certificates and their trust chain.
//!
//! A trust root signs intermediate server certificates; a server certificate signs sender
//! certificates binding {service id, optional phone-equivalent identifier, device id, identity
//! key} with an expiration. Both certificates serialize as (payload bytes, signature) so the
//! signature always verifies over the exact bytes that were signed; the accessor fields are
//! re-derived from the payload on deserialization and can never disagree with it.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::DeviceId;
use crate::cbor::{decode_cbor, encode_cbor};
use crate::crypto::Rng;
use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::crypto::xeddsa::{XSignature, xeddsa_sign, xeddsa_verify};
use crate::identity::IdentityKey;

#[derive(Serialize, Deserialize)]
struct ServerCertificatePayload {
    key_id: u32,
    key: PublicKey,
}

#[derive(Serialize, Deserialize)]
struct CertificateOuter {
    #[serde(with = "serde_bytes")]
    certificate: Vec<u8>,
    signature: XSignature,
}

/// Intermediate certificate: a server signing key endorsed by the trust root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerCertificate {
    key_id: u32,
    key: PublicKey,
    certificate: Vec<u8>,
    signature: XSignature,
}

impl ServerCertificate {
    pub fn new(
        key_id: u32,
        key: PublicKey,
        trust_root: &SecretKey,
        rng: &Rng,
    ) -> Result<Self, CertificateError> {
        let certificate = encode_cbor(&ServerCertificatePayload { key_id, key })
            .map_err(|_| CertificateError::Malformed)?;
        let signature =
            xeddsa_sign(&certificate, trust_root, rng).map_err(|_| CertificateError::Signing)?;
        Ok(Self {
            key_id,
            key,
            certificate,
            signature,
        })
    }

    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    pub fn key(&self) -> &PublicKey {
        &self.key
    }

    pub(crate) fn validate(&self, trust_root: &PublicKey) -> Result<(), CertificateError> {
        xeddsa_verify(&self.certificate, trust_root, &self.signature)
            .map_err(|_| CertificateError::InvalidSignature)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        encode_cbor(&CertificateOuter {
            certificate: self.certificate.clone(),
            signature: self.signature,
        })
        .map_err(|_| CertificateError::Malformed)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        let outer: CertificateOuter =
            decode_cbor(bytes).map_err(|_| CertificateError::Malformed)?;
        let payload: ServerCertificatePayload =
            decode_cbor(&outer.certificate[..]).map_err(|_| CertificateError::Malformed)?;
        Ok(Self {
            key_id: payload.key_id,
            key: payload.key,
            certificate: outer.certificate,
            signature: outer.signature,
        })
    }
}

impl Serialize for ServerCertificate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CertificateOuter {
            certificate: self.certificate.clone(),
            signature: self.signature,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerCertificate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let outer = CertificateOuter::deserialize(deserializer)?;
        let payload: ServerCertificatePayload = decode_cbor(&outer.certificate[..])
            .map_err(|_| serde::de::Error::custom("malformed server certificate payload"))?;
        Ok(Self {
            key_id: payload.key_id,
            key: payload.key,
            certificate: outer.certificate,
            signature: outer.signature,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SenderCertificatePayload {
    sender_uuid: String,
    sender_e164: Option<String>,
    sender_device_id: DeviceId,
    identity_key: IdentityKey,
    expiration_ms: u64,
    signer: ServerCertificate,
}

/// Signed binding of a sender's identifiers and identity key, carried inside every sealed
/// envelope and validated by the recipient at decrypt time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderCertificate {
    sender_uuid: String,
    sender_e164: Option<String>,
    sender_device_id: DeviceId,
    identity_key: IdentityKey,
    expiration_ms: u64,
    signer: ServerCertificate,
    certificate: Vec<u8>,
    signature: XSignature,
}

impl SenderCertificate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender_uuid: String,
        sender_e164: Option<String>,
        sender_device_id: DeviceId,
        identity_key: IdentityKey,
        expiration_ms: u64,
        signer: ServerCertificate,
        signer_key: &SecretKey,
        rng: &Rng,
    ) -> Result<Self, CertificateError> {
        let payload = SenderCertificatePayload {
            sender_uuid: sender_uuid.clone(),
            sender_e164: sender_e164.clone(),
            sender_device_id,
            identity_key,
            expiration_ms,
            signer: signer.clone(),
        };
        let certificate = encode_cbor(&payload).map_err(|_| CertificateError::Malformed)?;
        let signature =
            xeddsa_sign(&certificate, signer_key, rng).map_err(|_| CertificateError::Signing)?;
        Ok(Self {
            sender_uuid,
            sender_e164,
            sender_device_id,
            identity_key,
            expiration_ms,
            signer,
            certificate,
            signature,
        })
    }

    pub fn sender_uuid(&self) -> &str {
        &self.sender_uuid
    }

    pub fn sender_e164(&self) -> Option<&str> {
        self.sender_e164.as_deref()
    }

    pub fn sender_device_id(&self) -> DeviceId {
        self.sender_device_id
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    pub fn expiration_ms(&self) -> u64 {
        self.expiration_ms
    }

    pub fn signer(&self) -> &ServerCertificate {
        &self.signer
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        encode_cbor(&CertificateOuter {
            certificate: self.certificate.clone(),
            signature: self.signature,
        })
        .map_err(|_| CertificateError::Malformed)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        let outer: CertificateOuter =
            decode_cbor(bytes).map_err(|_| CertificateError::Malformed)?;
        Self::from_outer(outer)
    }

    fn from_outer(outer: CertificateOuter) -> Result<Self, CertificateError> {
        let payload: SenderCertificatePayload =
            decode_cbor(&outer.certificate[..]).map_err(|_| CertificateError::Malformed)?;
        Ok(Self {
            sender_uuid: payload.sender_uuid,
            sender_e164: payload.sender_e164,
            sender_device_id: payload.sender_device_id,
            identity_key: payload.identity_key,
            expiration_ms: payload.expiration_ms,
            signer: payload.signer,
            certificate: outer.certificate,
            signature: outer.signature,
        })
    }
}

impl Serialize for SenderCertificate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CertificateOuter {
            certificate: self.certificate.clone(),
            signature: self.signature,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SenderCertificate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let outer = CertificateOuter::deserialize(deserializer)?;
        Self::from_outer(outer)
            .map_err(|_| serde::de::Error::custom("malformed sender certificate payload"))
    }
}

/// Validates sender certificates against a set of trust roots.
#[derive(Clone, Debug)]
pub struct CertificateValidator {
    trust_roots: Vec<PublicKey>,
}

impl CertificateValidator {
    pub fn new(trust_roots: Vec<PublicKey>) -> Self {
        Self { trust_roots }
    }

    /// Checks the full chain: some trust root signed the server certificate, the server key
    /// signed the sender certificate, and the certificate has not expired at `now_ms`.
    pub fn validate(
        &self,
        certificate: &SenderCertificate,
        now_ms: u64,
    ) -> Result<(), CertificateError> {
        let trusted = self
            .trust_roots
            .iter()
            .any(|trust_root| certificate.signer().validate(trust_root).is_ok());
        if !trusted {
            return Err(CertificateError::InvalidSignature);
        }

        xeddsa_verify(
            &certificate.certificate,
            certificate.signer().key(),
            &certificate.signature,
        )
        .map_err(|_| CertificateError::InvalidSignature)?;

        if certificate.expiration_ms() < now_ms {
            return Err(CertificateError::Expired {
                expiration_ms: certificate.expiration_ms(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate is malformed")]
    Malformed,

    #[error("certificate could not be signed")]
    Signing,

    #[error("certificate signature chain does not verify")]
    InvalidSignature,

    #[error("certificate expired at {expiration_ms}")]
    Expired { expiration_ms: u64 },
}
