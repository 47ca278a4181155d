// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-describing wire messages.
//!
//! Every message serializes as one version byte (high nibble: the message's protocol version,
//! low nibble: the current version of this implementation) followed by a CBOR body;
//! [`SenderKeyMessage`] additionally appends a 64-byte XEdDSA signature over everything before
//! it. Each type validates version and structure independently on deserialization, before any
//! key material is touched.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::kem::KemCiphertext;
use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::crypto::xeddsa::{
    SIGNATURE_SIZE, XEdDSAError, XSignature, xeddsa_sign, xeddsa_verify,
};
use crate::crypto::{Rng, Secret};
use crate::identity::IdentityKey;
use crate::keys::{KyberPreKeyId, PreKeyId, SignedPreKeyId};

/// Protocol version spoken by this implementation.
pub const CIPHERTEXT_MESSAGE_CURRENT_VERSION: u8 = 4;

/// Type tag carried in sealed-sender envelopes so the inner ciphertext can be dispatched
/// without trial parsing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Ordinary double-ratchet message within an established session.
    Ratchet,
    /// Ratchet message carrying the handshake of a not-yet-acknowledged session.
    PreKey,
    /// Sender-key group message.
    SenderKey,
    /// Unencrypted content, e.g. a decryption-error report.
    Plaintext,
}

impl MessageType {
    pub fn into_u8(self) -> u8 {
        match self {
            Self::Ratchet => 2,
            Self::PreKey => 3,
            Self::SenderKey => 7,
            Self::Plaintext => 8,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, MessageError> {
        match value {
            2 => Ok(Self::Ratchet),
            3 => Ok(Self::PreKey),
            7 => Ok(Self::SenderKey),
            8 => Ok(Self::Plaintext),
            _ => Err(MessageError::UnknownType { value }),
        }
    }
}

/// Any outgoing ciphertext, tagged with its type.
#[derive(Clone, Debug)]
pub enum CiphertextMessage {
    Ratchet(RatchetMessage),
    PreKey(PreKeyMessage),
    SenderKey(SenderKeyMessage),
    Plaintext(PlaintextContent),
}

impl CiphertextMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Ratchet(_) => MessageType::Ratchet,
            Self::PreKey(_) => MessageType::PreKey,
            Self::SenderKey(_) => MessageType::SenderKey,
            Self::Plaintext(_) => MessageType::Plaintext,
        }
    }

    pub fn serialized(&self) -> &[u8] {
        match self {
            Self::Ratchet(message) => message.serialized(),
            Self::PreKey(message) => message.serialized(),
            Self::SenderKey(message) => message.serialized(),
            Self::Plaintext(message) => message.serialized(),
        }
    }
}

fn encode_version(version: u8) -> u8 {
    (version << 4) | CIPHERTEXT_MESSAGE_CURRENT_VERSION
}

fn decode_version(bytes: &[u8]) -> Result<u8, MessageError> {
    let first = bytes.first().ok_or(MessageError::Truncated)?;
    let version = first >> 4;
    if version < CIPHERTEXT_MESSAGE_CURRENT_VERSION {
        return Err(MessageError::LegacyVersion { version });
    }
    if version > CIPHERTEXT_MESSAGE_CURRENT_VERSION {
        return Err(MessageError::UnsupportedVersion { version });
    }
    Ok(version)
}

// Ordinary ratchet message.

#[derive(Serialize, Deserialize)]
struct RatchetMessageBody {
    ratchet_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
}

/// One step of the double ratchet: the sender's current ratchet key, the position in the
/// sending chain, and the AEAD ciphertext.
#[derive(Clone, Debug)]
pub struct RatchetMessage {
    version: u8,
    ratchet_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    ciphertext: Vec<u8>,
    serialized: Box<[u8]>,
}

impl RatchetMessage {
    pub(crate) fn new(
        version: u8,
        ratchet_key: PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: Vec<u8>,
    ) -> Result<Self, MessageError> {
        let body = RatchetMessageBody {
            ratchet_key,
            counter,
            previous_counter,
            ciphertext,
        };
        let mut serialized = vec![encode_version(version)];
        serialized.extend_from_slice(&encode_cbor(&body)?);
        Ok(Self {
            version,
            ratchet_key: body.ratchet_key,
            counter: body.counter,
            previous_counter: body.previous_counter,
            ciphertext: body.ciphertext,
            serialized: serialized.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let version = decode_version(bytes)?;
        let body: RatchetMessageBody = decode_cbor(&bytes[1..])?;
        Ok(Self {
            version,
            ratchet_key: body.ratchet_key,
            counter: body.counter,
            previous_counter: body.previous_counter,
            ciphertext: body.ciphertext,
            serialized: bytes.to_vec().into_boxed_slice(),
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn ratchet_key(&self) -> &PublicKey {
        &self.ratchet_key
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

// Handshake-carrying message.

#[derive(Serialize, Deserialize)]
struct PreKeyMessageBody {
    registration_id: u32,
    prekey_id: Option<PreKeyId>,
    signed_prekey_id: SignedPreKeyId,
    kyber_prekey_id: KyberPreKeyId,
    kyber_ciphertext: KemCiphertext,
    base_key: PublicKey,
    identity_key: IdentityKey,
    #[serde(with = "serde_bytes")]
    message: Vec<u8>,
}

/// Ratchet message wrapped with everything the responder needs to finish the handshake: the
/// ids of the consumed pre-keys, the KEM ciphertext, the initiator's ephemeral base key and
/// identity.
///
/// Sent in place of plain [`RatchetMessage`]s until the peer acknowledges the session.
#[derive(Clone, Debug)]
pub struct PreKeyMessage {
    version: u8,
    registration_id: u32,
    prekey_id: Option<PreKeyId>,
    signed_prekey_id: SignedPreKeyId,
    kyber_prekey_id: KyberPreKeyId,
    kyber_ciphertext: KemCiphertext,
    base_key: PublicKey,
    identity_key: IdentityKey,
    message: RatchetMessage,
    serialized: Box<[u8]>,
}

impl PreKeyMessage {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        version: u8,
        registration_id: u32,
        prekey_id: Option<PreKeyId>,
        signed_prekey_id: SignedPreKeyId,
        kyber_prekey_id: KyberPreKeyId,
        kyber_ciphertext: KemCiphertext,
        base_key: PublicKey,
        identity_key: IdentityKey,
        message: RatchetMessage,
    ) -> Result<Self, MessageError> {
        let body = PreKeyMessageBody {
            registration_id,
            prekey_id,
            signed_prekey_id,
            kyber_prekey_id,
            kyber_ciphertext: kyber_ciphertext.clone(),
            base_key,
            identity_key,
            message: message.serialized().to_vec(),
        };
        let mut serialized = vec![encode_version(version)];
        serialized.extend_from_slice(&encode_cbor(&body)?);
        Ok(Self {
            version,
            registration_id,
            prekey_id,
            signed_prekey_id,
            kyber_prekey_id,
            kyber_ciphertext,
            base_key,
            identity_key,
            message,
            serialized: serialized.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let version = decode_version(bytes)?;
        let body: PreKeyMessageBody = decode_cbor(&bytes[1..])?;
        let message = RatchetMessage::from_bytes(&body.message)?;
        Ok(Self {
            version,
            registration_id: body.registration_id,
            prekey_id: body.prekey_id,
            signed_prekey_id: body.signed_prekey_id,
            kyber_prekey_id: body.kyber_prekey_id,
            kyber_ciphertext: body.kyber_ciphertext,
            base_key: body.base_key,
            identity_key: body.identity_key,
            message,
            serialized: bytes.to_vec().into_boxed_slice(),
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    pub fn prekey_id(&self) -> Option<PreKeyId> {
        self.prekey_id
    }

    pub fn signed_prekey_id(&self) -> SignedPreKeyId {
        self.signed_prekey_id
    }

    pub fn kyber_prekey_id(&self) -> KyberPreKeyId {
        self.kyber_prekey_id
    }

    pub fn kyber_ciphertext(&self) -> &KemCiphertext {
        &self.kyber_ciphertext
    }

    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    pub fn message(&self) -> &RatchetMessage {
        &self.message
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

// Sender-key group messages.

#[derive(Serialize, Deserialize)]
struct SenderKeyDistributionMessageBody {
    distribution_id: Uuid,
    chain_id: u32,
    iteration: u32,
    chain_key: Secret<32>,
    signing_key: PublicKey,
}

/// Out-of-band advertisement of a sender's group chain: distribution id, chain id, the chain
/// key at the advertised iteration and the public signature key.
#[derive(Clone, Debug)]
pub struct SenderKeyDistributionMessage {
    version: u8,
    distribution_id: Uuid,
    chain_id: u32,
    iteration: u32,
    chain_key: Secret<32>,
    signing_key: PublicKey,
    serialized: Box<[u8]>,
}

impl SenderKeyDistributionMessage {
    pub(crate) fn new(
        version: u8,
        distribution_id: Uuid,
        chain_id: u32,
        iteration: u32,
        chain_key: Secret<32>,
        signing_key: PublicKey,
    ) -> Result<Self, MessageError> {
        let body = SenderKeyDistributionMessageBody {
            distribution_id,
            chain_id,
            iteration,
            chain_key: chain_key.clone(),
            signing_key,
        };
        let mut serialized = vec![encode_version(version)];
        serialized.extend_from_slice(&encode_cbor(&body)?);
        Ok(Self {
            version,
            distribution_id,
            chain_id,
            iteration,
            chain_key,
            signing_key,
            serialized: serialized.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let version = decode_version(bytes)?;
        let body: SenderKeyDistributionMessageBody = decode_cbor(&bytes[1..])?;
        Ok(Self {
            version,
            distribution_id: body.distribution_id,
            chain_id: body.chain_id,
            iteration: body.iteration,
            chain_key: body.chain_key,
            signing_key: body.signing_key,
            serialized: bytes.to_vec().into_boxed_slice(),
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn distribution_id(&self) -> Uuid {
        self.distribution_id
    }

    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub(crate) fn chain_key(&self) -> &Secret<32> {
        &self.chain_key
    }

    pub fn signing_key(&self) -> &PublicKey {
        &self.signing_key
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

#[derive(Serialize, Deserialize)]
struct SenderKeyMessageBody {
    distribution_id: Uuid,
    chain_id: u32,
    iteration: u32,
    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
}

/// Group message: self-contained ciphertext signed with the sender chain's signature key, so
/// any group member can authenticate the origin without a pairwise session.
#[derive(Clone, Debug)]
pub struct SenderKeyMessage {
    version: u8,
    distribution_id: Uuid,
    chain_id: u32,
    iteration: u32,
    ciphertext: Vec<u8>,
    serialized: Box<[u8]>,
}

impl SenderKeyMessage {
    pub(crate) fn new(
        version: u8,
        distribution_id: Uuid,
        chain_id: u32,
        iteration: u32,
        ciphertext: Vec<u8>,
        signature_key: &SecretKey,
        rng: &Rng,
    ) -> Result<Self, MessageError> {
        let body = SenderKeyMessageBody {
            distribution_id,
            chain_id,
            iteration,
            ciphertext,
        };
        let mut serialized = vec![encode_version(version)];
        serialized.extend_from_slice(&encode_cbor(&body)?);
        let signature = xeddsa_sign(&serialized, signature_key, rng)?;
        serialized.extend_from_slice(signature.as_bytes());
        Ok(Self {
            version,
            distribution_id,
            chain_id,
            iteration,
            ciphertext: body.ciphertext,
            serialized: serialized.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let version = decode_version(bytes)?;
        if bytes.len() <= 1 + SIGNATURE_SIZE {
            return Err(MessageError::Truncated);
        }
        let body_end = bytes.len() - SIGNATURE_SIZE;
        let body: SenderKeyMessageBody = decode_cbor(&bytes[1..body_end])?;
        Ok(Self {
            version,
            distribution_id: body.distribution_id,
            chain_id: body.chain_id,
            iteration: body.iteration,
            ciphertext: body.ciphertext,
            serialized: bytes.to_vec().into_boxed_slice(),
        })
    }

    /// Verifies the trailing signature against the advertised chain's signature key.
    pub(crate) fn verify_signature(&self, signing_key: &PublicKey) -> Result<(), MessageError> {
        let body_end = self.serialized.len() - SIGNATURE_SIZE;
        let signature_bytes: [u8; SIGNATURE_SIZE] = self.serialized[body_end..]
            .try_into()
            .map_err(|_| MessageError::Truncated)?;
        xeddsa_verify(
            &self.serialized[..body_end],
            signing_key,
            &XSignature::from_bytes(signature_bytes),
        )?;
        Ok(())
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn distribution_id(&self) -> Uuid {
        self.distribution_id
    }

    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

// Plaintext content.

#[derive(Serialize, Deserialize)]
struct PlaintextContentBody {
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
}

/// Unencrypted content travelling through a sealed-sender envelope, carrying a
/// [`DecryptionErrorMessage`].
#[derive(Clone, Debug)]
pub struct PlaintextContent {
    body: Vec<u8>,
    serialized: Box<[u8]>,
}

impl PlaintextContent {
    pub fn new(message: &DecryptionErrorMessage) -> Result<Self, MessageError> {
        let body = encode_cbor(message)?;
        let outer = PlaintextContentBody { body: body.clone() };
        let mut serialized = vec![encode_version(CIPHERTEXT_MESSAGE_CURRENT_VERSION)];
        serialized.extend_from_slice(&encode_cbor(&outer)?);
        Ok(Self {
            body,
            serialized: serialized.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        decode_version(bytes)?;
        let outer: PlaintextContentBody = decode_cbor(&bytes[1..])?;
        Ok(Self {
            body: outer.body,
            serialized: bytes.to_vec().into_boxed_slice(),
        })
    }

    /// The transported content; for this crate always a CBOR-encoded
    /// [`DecryptionErrorMessage`].
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn decryption_error_message(&self) -> Result<DecryptionErrorMessage, MessageError> {
        Ok(decode_cbor(&self.body[..])?)
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }
}

/// Report that a received message could not be decrypted, precise enough for the original
/// sender to find the session which produced it and resend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionErrorMessage {
    ratchet_key: Option<PublicKey>,
    timestamp_ms: u64,
    device_id: u32,
}

impl DecryptionErrorMessage {
    /// Builds a report for `original_bytes`, extracting the ratchet key when the failed
    /// message was a session message.
    pub fn for_original(
        original_bytes: &[u8],
        original_type: MessageType,
        timestamp_ms: u64,
        device_id: u32,
    ) -> Result<Self, MessageError> {
        let ratchet_key = match original_type {
            MessageType::Ratchet => {
                Some(*RatchetMessage::from_bytes(original_bytes)?.ratchet_key())
            }
            MessageType::PreKey => {
                Some(*PreKeyMessage::from_bytes(original_bytes)?.message().ratchet_key())
            }
            MessageType::SenderKey | MessageType::Plaintext => None,
        };
        Ok(Self {
            ratchet_key,
            timestamp_ms,
            device_id,
        })
    }

    pub fn ratchet_key(&self) -> Option<&PublicKey> {
        self.ratchet_key.as_ref()
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message is truncated")]
    Truncated,

    #[error("message version {version} is no longer supported")]
    LegacyVersion { version: u8 },

    #[error("message version {version} is not supported yet")]
    UnsupportedVersion { version: u8 },

    #[error("unknown message type {value}")]
    UnknownType { value: u8 },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Signature(#[from] XEdDSAError),
}
