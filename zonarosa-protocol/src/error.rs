// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy of the protocol.
//!
//! One tagged type instead of an exception hierarchy; callers match on the variant. The
//! variants group into structural failures (malformed input, never retried), trust failures
//! (blocked pending an explicit decision), state failures (the caller must re-establish a
//! session), replay failures (hard failures, never retried with the same input) and the benign
//! [`ProtocolError::SelfSend`] signal. The crate never retries internally; every failure
//! propagates synchronously.
use thiserror::Error;
use uuid::Uuid;

use crate::address::{AddressError, ProtocolAddress};
use crate::cbor::{DecodeError, EncodeError};
use crate::crypto::RngError;
use crate::crypto::aead::AeadError;
use crate::crypto::hpke::HpkeError;
use crate::crypto::kem::KemError;
use crate::crypto::x25519::X25519Error;
use crate::crypto::xeddsa::XEdDSAError;
use crate::keys::{KeyRecordError, KyberPreKeyId, PreKeyBundleError, SignedPreKeyId};
use crate::messages::MessageError;
use crate::sealed::CertificateError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    // Structural failures.
    /// The message is syntactically valid but cannot be processed, e.g. it fails to
    /// authenticate under any session state.
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: &'static str },

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    KeyRecord(#[from] KeyRecordError),

    #[error(transparent)]
    PreKeyBundle(#[from] PreKeyBundleError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("sealed sender envelope is malformed")]
    InvalidSealedSenderMessage,

    // Trust failures.
    /// The peer's identity key changed and no explicit trust decision has been made. Never
    /// bypassed silently; the operation is blocked until the caller decides.
    #[error("untrusted identity for address {address}")]
    UntrustedIdentity { address: ProtocolAddress },

    // State failures: the caller must re-establish a session or republish keys.
    #[error("no session for address {address}")]
    SessionNotFound { address: ProtocolAddress },

    #[error("no pre-key record found for id {id}")]
    InvalidPreKeyId { id: u32 },

    #[error("no sender key for distribution {distribution_id}")]
    SenderKeyNotFound { distribution_id: Uuid },

    #[error("no sender key state for distribution {distribution_id} and chain {chain_id}")]
    NoSenderKeyState { distribution_id: Uuid, chain_id: u32 },

    #[error("registration id {id} of {address} cannot be encoded")]
    InvalidRegistrationId { address: ProtocolAddress, id: u32 },

    // Replay failures: hard failures, indicating either an attack or a store-consistency bug.
    /// The message key for this counter was already consumed.
    #[error("duplicate message with counter {counter}")]
    DuplicateMessage { counter: u32 },

    /// A Kyber pre-key was marked used twice with two different base keys.
    #[error(
        "kyber pre-key {kyber_prekey_id} (signed pre-key {signed_prekey_id}) was already used \
         with a different base key"
    )]
    KyberPreKeyReused {
        kyber_prekey_id: KyberPreKeyId,
        signed_prekey_id: SignedPreKeyId,
    },

    // Benign signal, to be filtered above the core.
    /// The envelope's claimed sender is this very device.
    #[error("sealed sender message is from our own address")]
    SelfSend,

    // Caller-contract violations.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Infrastructure.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    Aead(#[from] AeadError),

    #[error(transparent)]
    Hpke(#[from] HpkeError),

    #[error(transparent)]
    Kem(#[from] KemError),

    #[error(transparent)]
    X25519(#[from] X25519Error),

    #[error(transparent)]
    XEdDSA(#[from] XEdDSAError),
}
