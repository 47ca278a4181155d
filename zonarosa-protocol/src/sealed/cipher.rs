// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed-sender envelope encryption and decryption.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::{DeviceId, ProtocolAddress, SERVICE_ID_BINARY_SIZE, ServiceId};
use crate::cbor::{decode_cbor, encode_cbor};
use crate::crypto::Rng;
use crate::crypto::aead::{AEAD_KEY_SIZE, AEAD_NONCE_SIZE, aead_decrypt, aead_encrypt};
use crate::crypto::hpke::{HpkeCiphertext, hpke_open, hpke_seal};
use crate::error::ProtocolError;
use crate::group::group_decrypt;
use crate::messages::{
    CiphertextMessage, MessageType, PlaintextContent, PreKeyMessage, RatchetMessage,
    SenderKeyMessage,
};
use crate::sealed::{CertificateValidator, SenderCertificate};
use crate::session::{SessionRecord, decrypt_message, decrypt_prekey_message, encrypt_message};
use crate::traits::{
    IdentityKeyStore, KyberPreKeyStore, PreKeyStore, SenderKeyStore, SessionStore,
    SignedPreKeyStore,
};

/// Version byte leading every sealed-sender envelope.
const SEALED_SENDER_VERSION: u8 = 1;

/// HPKE domain separation for sealed-sender envelopes.
const SEALED_SENDER_INFO: &[u8] = b"ZonaRosaSealedSender";

/// Registration ids must fit 14 bits to be encodable in multi-recipient headers.
const MAX_MULTI_RECIPIENT_REGISTRATION_ID: u32 = 0x3FFF;

/// How the recipient should treat an envelope whose contents fail to decrypt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentHint {
    /// No guidance; show an error and request resend.
    Default,
    /// Safe to ask the sender for a resend, the content will still be meaningful.
    Resendable,
    /// Supplementary content; fail silently, a resend request is not worth it.
    Implicit,
    /// Produced by a newer implementation; preserved verbatim.
    Unknown(u32),
}

impl ContentHint {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Default => 0,
            Self::Resendable => 1,
            Self::Implicit => 2,
            Self::Unknown(value) => value,
        }
    }

    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Default,
            1 => Self::Resendable,
            2 => Self::Implicit,
            value => Self::Unknown(value),
        }
    }
}

/// The sealed payload: the inner ciphertext plus everything the recipient needs to
/// authenticate and dispatch it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnidentifiedSenderMessageContent {
    message_type: u8,
    sender_certificate: SenderCertificate,
    #[serde(with = "serde_bytes")]
    contents: Vec<u8>,
    content_hint: ContentHint,
    group_id: Option<serde_bytes::ByteBuf>,
}

impl UnidentifiedSenderMessageContent {
    pub fn new(
        message: &CiphertextMessage,
        sender_certificate: SenderCertificate,
        content_hint: ContentHint,
        group_id: Option<Vec<u8>>,
    ) -> Self {
        Self {
            message_type: message.message_type().into_u8(),
            sender_certificate,
            contents: message.serialized().to_vec(),
            content_hint,
            group_id: group_id.map(serde_bytes::ByteBuf::from),
        }
    }

    pub fn message_type(&self) -> Result<MessageType, ProtocolError> {
        Ok(MessageType::from_u8(self.message_type)?)
    }

    pub fn sender_certificate(&self) -> &SenderCertificate {
        &self.sender_certificate
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn content_hint(&self) -> ContentHint {
        self.content_hint
    }

    pub fn group_id(&self) -> Option<&[u8]> {
        self.group_id.as_ref().map(|group_id| group_id.as_slice())
    }
}

/// Envelope as received by one device.
#[derive(Serialize, Deserialize)]
enum SealedSenderEnvelope {
    /// The whole payload is sealed to the recipient's identity key.
    Direct { ciphertext: HpkeCiphertext },

    /// Multi-recipient delivery: the shared body is encrypted under a message key which is
    /// sealed per recipient.
    Shared {
        encrypted_key: HpkeCiphertext,
        #[serde(with = "serde_bytes")]
        nonce: [u8; AEAD_NONCE_SIZE],
        #[serde(with = "serde_bytes")]
        body: Vec<u8>,
    },
}

/// One compact header per destination device of a multi-recipient envelope.
#[derive(Serialize, Deserialize)]
struct RecipientHeader {
    #[serde(with = "serde_bytes")]
    service_id: [u8; SERVICE_ID_BINARY_SIZE],
    device_id: DeviceId,
    registration_id: u32,
    encrypted_key: HpkeCiphertext,
}

/// Multi-recipient wire format handed to the server: per-device headers, excluded service ids
/// and one shared encrypted body.
#[derive(Serialize, Deserialize)]
struct MultiRecipientEnvelope {
    recipients: Vec<RecipientHeader>,
    excluded: Vec<serde_bytes::ByteBuf>,
    #[serde(with = "serde_bytes")]
    nonce: [u8; AEAD_NONCE_SIZE],
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
}

fn encode_envelope<T: Serialize>(envelope: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = vec![SEALED_SENDER_VERSION];
    bytes.extend_from_slice(&encode_cbor(envelope)?);
    Ok(bytes)
}

fn decode_envelope<T: for<'a> Deserialize<'a>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    match bytes.split_first() {
        Some((&SEALED_SENDER_VERSION, body)) => {
            decode_cbor(body).map_err(|_| ProtocolError::InvalidSealedSenderMessage)
        }
        _ => Err(ProtocolError::InvalidSealedSenderMessage),
    }
}

/// Session-encrypts `plaintext` for `destination` and seals it with the default content hint.
pub fn sealed_sender_encrypt(
    destination: &ProtocolAddress,
    sender_certificate: SenderCertificate,
    plaintext: &[u8],
    session_store: &mut dyn SessionStore,
    identity_store: &mut dyn IdentityKeyStore,
    now_ms: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let message = encrypt_message(plaintext, destination, session_store, identity_store, now_ms)?;
    let content = UnidentifiedSenderMessageContent::new(
        &message,
        sender_certificate,
        ContentHint::Default,
        None,
    );
    sealed_sender_encrypt_from_usmc(destination, &content, identity_store)
}

/// Seals an already-assembled payload to `destination`'s identity key.
///
/// The destination's identity must be known locally (a session established or its identity
/// saved); nothing on the resulting envelope identifies the sender.
pub fn sealed_sender_encrypt_from_usmc(
    destination: &ProtocolAddress,
    content: &UnidentifiedSenderMessageContent,
    identity_store: &dyn IdentityKeyStore,
) -> Result<Vec<u8>, ProtocolError> {
    let their_identity =
        identity_store
            .identity(destination)?
            .ok_or_else(|| ProtocolError::SessionNotFound {
                address: destination.clone(),
            })?;

    let serialized = encode_cbor(content)?;
    let ciphertext = hpke_seal(
        their_identity.public_key(),
        Some(SEALED_SENDER_INFO),
        Some(their_identity.public_key().as_bytes()),
        &serialized,
    )?;

    encode_envelope(&SealedSenderEnvelope::Direct { ciphertext })
}

/// Seals one payload to many destination devices.
///
/// The body is encrypted exactly once under a random message key; each destination device only
/// adds a compact header with the key sealed to its identity. `destinations` and
/// `destination_sessions` must correspond pairwise; a length mismatch is a caller bug, not a
/// protocol condition. `excluded_recipients` are listed by service id with no key material, so
/// the server can enforce group membership without the sender holding sessions for them.
pub fn sealed_sender_multi_recipient_encrypt(
    destinations: &[&ProtocolAddress],
    destination_sessions: &[&SessionRecord],
    excluded_recipients: &[ServiceId],
    content: &UnidentifiedSenderMessageContent,
    rng: &Rng,
) -> Result<Vec<u8>, ProtocolError> {
    if destinations.len() != destination_sessions.len() {
        return Err(ProtocolError::InvalidArgument(format!(
            "got {} destinations but {} sessions",
            destinations.len(),
            destination_sessions.len()
        )));
    }

    let message_key: [u8; AEAD_KEY_SIZE] = rng.random_array()?;
    let nonce: [u8; AEAD_NONCE_SIZE] = rng.random_array()?;
    let serialized = encode_cbor(content)?;
    let body = aead_encrypt(&message_key, &nonce, &serialized, b"")?;

    let mut recipients = Vec::with_capacity(destinations.len());
    for (destination, session) in destinations.iter().zip(destination_sessions) {
        let state = session
            .session_state()
            .ok_or_else(|| ProtocolError::SessionNotFound {
                address: (*destination).clone(),
            })?;

        let registration_id = state.remote_registration_id();
        if registration_id > MAX_MULTI_RECIPIENT_REGISTRATION_ID {
            return Err(ProtocolError::InvalidRegistrationId {
                address: (*destination).clone(),
                id: registration_id,
            });
        }

        let service_id = ServiceId::parse_from_service_id_string(destination.name())?;
        let encrypted_key = hpke_seal(
            state.remote_identity().public_key(),
            Some(SEALED_SENDER_INFO),
            None,
            &message_key,
        )?;

        recipients.push(RecipientHeader {
            service_id: service_id.to_fixed_width_binary(),
            device_id: destination.device_id(),
            registration_id,
            encrypted_key,
        });
    }

    debug!(
        target: "protocol::sealed",
        recipients = recipients.len(),
        excluded = excluded_recipients.len(),
        "multi-recipient envelope assembled"
    );

    encode_envelope(&MultiRecipientEnvelope {
        recipients,
        excluded: excluded_recipients
            .iter()
            .map(|service_id| serde_bytes::ByteBuf::from(service_id.to_fixed_width_binary().to_vec()))
            .collect(),
        nonce,
        body,
    })
}

/// Extracts the envelope one device would receive from a multi-recipient envelope.
///
/// This is what the server does per destination; exposed for tests and server-side tooling.
pub fn sealed_sender_multi_recipient_message_for_single_recipient(
    envelope: &[u8],
    destination: &ServiceId,
    device_id: DeviceId,
) -> Result<Vec<u8>, ProtocolError> {
    let multi: MultiRecipientEnvelope = decode_envelope(envelope)?;
    let wanted = destination.to_fixed_width_binary();
    let header = multi
        .recipients
        .into_iter()
        .find(|header| header.service_id == wanted && header.device_id == device_id)
        .ok_or_else(|| {
            ProtocolError::InvalidArgument(format!(
                "envelope has no header for {destination}.{device_id}"
            ))
        })?;

    encode_envelope(&SealedSenderEnvelope::Shared {
        encrypted_key: header.encrypted_key,
        nonce: multi.nonce,
        body: multi.body,
    })
}

/// Opens an envelope with our identity key, yielding the payload without dispatching it.
pub fn sealed_sender_decrypt_to_usmc(
    envelope: &[u8],
    identity_store: &dyn IdentityKeyStore,
) -> Result<UnidentifiedSenderMessageContent, ProtocolError> {
    let our_identity = identity_store.identity_key_pair()?;
    let our_public = *our_identity.public_key();

    let serialized = match decode_envelope::<SealedSenderEnvelope>(envelope)? {
        SealedSenderEnvelope::Direct { ciphertext } => hpke_open(
            &ciphertext,
            our_identity.secret_key(),
            Some(SEALED_SENDER_INFO),
            Some(our_public.as_bytes()),
        )
        .map_err(|_| ProtocolError::InvalidSealedSenderMessage)?,
        SealedSenderEnvelope::Shared {
            encrypted_key,
            nonce,
            body,
        } => {
            let message_key = hpke_open(
                &encrypted_key,
                our_identity.secret_key(),
                Some(SEALED_SENDER_INFO),
                None,
            )
            .map_err(|_| ProtocolError::InvalidSealedSenderMessage)?;
            let message_key: [u8; AEAD_KEY_SIZE] = message_key
                .as_slice()
                .try_into()
                .map_err(|_| ProtocolError::InvalidSealedSenderMessage)?;
            aead_decrypt(&message_key, &nonce, &body, b"")
                .map_err(|_| ProtocolError::InvalidSealedSenderMessage)?
        }
    };

    decode_cbor(&serialized[..]).map_err(|_| ProtocolError::InvalidSealedSenderMessage)
}

/// Everything learned from one sealed envelope: the authenticated sender and the decrypted
/// inner message.
#[derive(Debug)]
pub struct SealedSenderDecryptionResult {
    pub sender_uuid: String,
    pub sender_e164: Option<String>,
    pub device_id: DeviceId,
    pub message_type: MessageType,
    pub group_id: Option<Vec<u8>>,
    pub message: Vec<u8>,
}

/// Opens, validates and dispatches a sealed envelope.
///
/// Certificate validation happens against the trust root with `timestamp_ms` as current time.
/// An envelope whose certified sender is this very device fails with
/// [`ProtocolError::SelfSend`], a benign signal to be filtered above the core. The inner
/// ciphertext is dispatched to the session cipher, the group engine or the plaintext path
/// based on its type tag.
#[allow(clippy::too_many_arguments)]
pub fn sealed_sender_decrypt(
    envelope: &[u8],
    validator: &CertificateValidator,
    timestamp_ms: u64,
    local_e164: Option<&str>,
    local_uuid: &str,
    local_device_id: DeviceId,
    session_store: &mut dyn SessionStore,
    identity_store: &mut dyn IdentityKeyStore,
    prekey_store: &mut dyn PreKeyStore,
    signed_prekey_store: &mut dyn SignedPreKeyStore,
    kyber_prekey_store: &mut dyn KyberPreKeyStore,
    sender_key_store: &mut dyn SenderKeyStore,
    rng: &Rng,
) -> Result<SealedSenderDecryptionResult, ProtocolError> {
    let content = sealed_sender_decrypt_to_usmc(envelope, identity_store)?;
    let certificate = content.sender_certificate();
    validator.validate(certificate, timestamp_ms)?;

    let is_local_uuid = certificate.sender_uuid() == local_uuid;
    let is_local_e164 = match (local_e164, certificate.sender_e164()) {
        (Some(local), Some(sender)) => local == sender,
        _ => false,
    };
    if (is_local_uuid || is_local_e164) && certificate.sender_device_id() == local_device_id {
        return Err(ProtocolError::SelfSend);
    }

    let remote_address = ProtocolAddress::new(
        certificate.sender_uuid().to_string(),
        certificate.sender_device_id(),
    );

    let message_type = content.message_type()?;
    let message = match message_type {
        MessageType::Ratchet => decrypt_message(
            &RatchetMessage::from_bytes(content.contents())?,
            &remote_address,
            session_store,
            identity_store,
            rng,
        )?,
        MessageType::PreKey => decrypt_prekey_message(
            &PreKeyMessage::from_bytes(content.contents())?,
            &remote_address,
            session_store,
            identity_store,
            prekey_store,
            signed_prekey_store,
            kyber_prekey_store,
            rng,
        )?,
        MessageType::SenderKey => group_decrypt(
            &SenderKeyMessage::from_bytes(content.contents())?,
            &remote_address,
            sender_key_store,
        )?,
        MessageType::Plaintext => PlaintextContent::from_bytes(content.contents())?
            .body()
            .to_vec(),
    };

    Ok(SealedSenderDecryptionResult {
        sender_uuid: certificate.sender_uuid().to_string(),
        sender_e164: certificate.sender_e164().map(str::to_string),
        device_id: certificate.sender_device_id(),
        message_type,
        group_id: content.group_id().map(<[u8]>::to_vec),
        message,
    })
}
