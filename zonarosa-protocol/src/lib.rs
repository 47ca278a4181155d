// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zonarosa-protocol` provides asynchronous, end-to-end encrypted messaging sessions between
//! devices identified by long-lived identity keys and short-lived device addresses.
//!
//! ## Protocol layers
//!
//! **Sessions** are established with a post-quantum-augmented extended Diffie-Hellman
//! handshake against a published [`PreKeyBundle`]: a combination of classical X25519
//! agreements with a Kyber-1024 encapsulation, so recorded traffic stays confidential even
//! against a future quantum adversary ("harvest now, decrypt later"). No round trip with the
//! recipient is needed; the first message carries the handshake until it is acknowledged.
//!
//! **Messages** within a session are encrypted with a double ratchet: a Diffie-Hellman
//! ratchet steps the session's root chain whenever the peer shows a new ratchet key, and a
//! symmetric chain derives one single-use key per message. Old keys are destroyed as the
//! chains advance, which yields forward secrecy; fresh DH steps yield post-compromise
//! recovery. Out-of-order delivery is tolerated within bounded windows, and consumed message
//! keys are never accepted twice.
//!
//! **Groups** avoid pairwise fan-out with sender keys: each sender keeps one ratcheting chain
//! per group, distributes it once out-of-band, and signs every group message with a per-chain
//! signature key so members authenticate the origin without a pairwise session.
//!
//! **Sealed sender** hides who is talking to whom from the transport: ciphertexts travel in
//! envelopes encrypted to the recipient's identity key, carrying a server-issued certificate
//! which the recipient (and only the recipient) validates against a trust root. A
//! multi-recipient variant encrypts the payload once and adds a compact header per
//! destination device.
//!
//! ## Storage
//!
//! The crate performs no I/O and never persists state implicitly. Every operation receives
//! the store capabilities it needs ([`traits`]) and commits through them at one defined
//! point; [`store::MemoryProtocolStore`] is a complete in-memory implementation for tests and
//! as a reference.
//!
//! ## Concurrency
//!
//! All operations are synchronous, CPU-bound computations. Session state is a single mutable
//! resource per address, read, transformed and written back non-atomically: callers must
//! serialize the whole read-modify-write sequence per protocol address. There is no
//! cancellation mid-ratchet-step; see [`decrypt_message`] for why a decrypt whose commit was
//! lost must not be naively retried.
//!
//! ## Errors
//!
//! Failures are tagged variants of [`ProtocolError`], grouped into structural, trust, state
//! and replay failures plus the benign [`ProtocolError::SelfSend`] signal. The crate
//! implements no retry policy; every retry decision belongs to the caller.
mod address;
pub mod cbor;
pub mod crypto;
mod error;
mod group;
mod identity;
mod keys;
mod messages;
#[cfg(test)]
mod protocol_tests;
mod ratchet;
mod sealed;
mod session;
pub mod store;
pub mod traits;

pub use address::{
    AddressError, DeviceId, MAX_DEVICE_ID, ProtocolAddress, SERVICE_ID_BINARY_SIZE, ServiceId,
};
pub use crypto::{Rng, RngError};
pub use error::ProtocolError;
pub use group::{
    SenderKeyRecord, create_sender_key_distribution_message, group_decrypt, group_encrypt,
    process_sender_key_distribution_message,
};
pub use identity::{IdentityKey, IdentityKeyPair};
pub use keys::{
    KeyRecordError, KyberPreKeyId, KyberPreKeyRecord, PreKeyBundle, PreKeyBundleError, PreKeyId,
    PreKeyRecord, SignedPreKeyId, SignedPreKeyRecord,
};
pub use messages::{
    CIPHERTEXT_MESSAGE_CURRENT_VERSION, CiphertextMessage, DecryptionErrorMessage, MessageError,
    MessageType, PlaintextContent, PreKeyMessage, RatchetMessage, SenderKeyDistributionMessage,
    SenderKeyMessage,
};
pub use sealed::{
    CertificateError, CertificateValidator, ContentHint, SealedSenderDecryptionResult,
    SenderCertificate, ServerCertificate, UnidentifiedSenderMessageContent, sealed_sender_decrypt,
    sealed_sender_decrypt_to_usmc, sealed_sender_encrypt, sealed_sender_encrypt_from_usmc,
    sealed_sender_multi_recipient_encrypt,
    sealed_sender_multi_recipient_message_for_single_recipient,
};
pub use session::{
    SessionRecord, SessionState, decrypt_message, decrypt_prekey_message, encrypt_message,
    process_prekey_bundle, remote_registration_id, session_version,
};
pub use store::{
    MemoryIdentityStore, MemoryKyberPreKeyStore, MemoryPreKeyStore, MemoryProtocolStore,
    MemorySenderKeyStore, MemorySessionStore, MemorySignedPreKeyStore,
};
pub use traits::{
    Direction, IdentityChange, IdentityKeyStore, KyberPreKeyStore, PreKeyStore, SenderKeyStore,
    SessionStore, SignedPreKeyStore,
};
