// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store capabilities the protocol consumes.
//!
//! The core performs no I/O and never persists implicitly; every operation receives the
//! capabilities it needs as independent trait objects and commits through them at one defined
//! point. Identity, pre-key, session and sender-key storage are logically independent; a
//! single type may implement all of them (see [`MemoryProtocolStore`](crate::store)), but
//! nothing in the protocol requires that.
//!
//! None of these stores are safe for concurrent use against the same address without external
//! serialization: session state is read, transformed and written back non-atomically, so
//! callers must guard the whole read-modify-write sequence per protocol address.
use uuid::Uuid;

use crate::address::{DeviceId, ProtocolAddress};
use crate::crypto::x25519::PublicKey;
use crate::error::ProtocolError;
use crate::group::SenderKeyRecord;
use crate::identity::{IdentityKey, IdentityKeyPair};
use crate::keys::{
    KyberPreKeyId, KyberPreKeyRecord, PreKeyId, PreKeyRecord, SignedPreKeyId, SignedPreKeyRecord,
};
use crate::session::SessionRecord;

/// Whether an identity is about to be used for sending or was seen on a received message.
///
/// Trust policies may differ per direction, e.g. block sending to a changed key but keep
/// decrypting incoming traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Sending,
    Receiving,
}

/// Outcome of [`IdentityKeyStore::save_identity`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IdentityChange {
    /// First sighting of this address, or the key matches what we had.
    NewOrUnchanged,
    /// The address previously mapped to a different key, which has now been replaced.
    ReplacedExisting,
}

/// Our own identity and the identities we have learned about remote addresses.
pub trait IdentityKeyStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, ProtocolError>;

    fn local_registration_id(&self) -> Result<u32, ProtocolError>;

    fn save_identity(
        &mut self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<IdentityChange, ProtocolError>;

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool, ProtocolError>;

    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, ProtocolError>;
}

/// Our own one-time pre-keys.
pub trait PreKeyStore {
    /// Loads a record; a missing id is [`ProtocolError::InvalidPreKeyId`], signalling that the
    /// peer referenced key material we no longer (or never did) hold.
    fn prekey(&self, id: PreKeyId) -> Result<PreKeyRecord, ProtocolError>;

    fn save_prekey(&mut self, id: PreKeyId, record: &PreKeyRecord) -> Result<(), ProtocolError>;

    fn contains_prekey(&self, id: PreKeyId) -> Result<bool, ProtocolError>;

    /// Removes a consumed one-time pre-key. Each record is consumed at most once.
    fn remove_prekey(&mut self, id: PreKeyId) -> Result<(), ProtocolError>;

    /// All of the own device's records, for republishing.
    fn all_prekeys(&self) -> Result<Vec<PreKeyRecord>, ProtocolError>;
}

/// Our own signed pre-keys.
pub trait SignedPreKeyStore {
    fn signed_prekey(&self, id: SignedPreKeyId) -> Result<SignedPreKeyRecord, ProtocolError>;

    fn save_signed_prekey(
        &mut self,
        id: SignedPreKeyId,
        record: &SignedPreKeyRecord,
    ) -> Result<(), ProtocolError>;

    fn contains_signed_prekey(&self, id: SignedPreKeyId) -> Result<bool, ProtocolError>;

    fn all_signed_prekeys(&self) -> Result<Vec<SignedPreKeyRecord>, ProtocolError>;
}

/// Our own Kyber pre-keys.
pub trait KyberPreKeyStore {
    fn kyber_prekey(&self, id: KyberPreKeyId) -> Result<KyberPreKeyRecord, ProtocolError>;

    fn save_kyber_prekey(
        &mut self,
        id: KyberPreKeyId,
        record: &KyberPreKeyRecord,
    ) -> Result<(), ProtocolError>;

    fn contains_kyber_prekey(&self, id: KyberPreKeyId) -> Result<bool, ProtocolError>;

    fn all_kyber_prekeys(&self) -> Result<Vec<KyberPreKeyRecord>, ProtocolError>;

    /// Records that this `(kyber pre-key, signed pre-key)` pair was consumed by a handshake
    /// with `base_key`.
    ///
    /// Marking the same pair with the identical base key again is a retransmission and passes;
    /// marking it with a different base key is [`ProtocolError::KyberPreKeyReused`], a hard
    /// failure that must never be retried.
    fn mark_kyber_prekey_used(
        &mut self,
        kyber_prekey_id: KyberPreKeyId,
        signed_prekey_id: SignedPreKeyId,
        base_key: &PublicKey,
    ) -> Result<(), ProtocolError>;
}

/// Sessions with remote devices.
pub trait SessionStore {
    fn load_session(
        &self,
        address: &ProtocolAddress,
    ) -> Result<Option<SessionRecord>, ProtocolError>;

    /// Bulk load for multi-recipient sends; fails with [`ProtocolError::SessionNotFound`] if
    /// any requested address has no session.
    fn load_existing_sessions(
        &self,
        addresses: &[&ProtocolAddress],
    ) -> Result<Vec<SessionRecord>, ProtocolError>;

    /// Device ids of all sessions for the logical user `name`, excluding the primary device.
    fn sub_device_sessions(&self, name: &str) -> Result<Vec<DeviceId>, ProtocolError>;

    fn store_session(
        &mut self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), ProtocolError>;

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, ProtocolError>;

    fn delete_session(&mut self, address: &ProtocolAddress) -> Result<(), ProtocolError>;

    /// Deletes every session of the logical user `name`, returning how many there were.
    fn delete_all_sessions(&mut self, name: &str) -> Result<usize, ProtocolError>;
}

/// Sender-key chains for group messaging, keyed by sender address and distribution id.
pub trait SenderKeyStore {
    fn store_sender_key(
        &mut self,
        sender: &ProtocolAddress,
        distribution_id: Uuid,
        record: &SenderKeyRecord,
    ) -> Result<(), ProtocolError>;

    fn load_sender_key(
        &self,
        sender: &ProtocolAddress,
        distribution_id: Uuid,
    ) -> Result<Option<SenderKeyRecord>, ProtocolError>;
}
