// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory store implementations.
//!
//! One independent store type per capability, aggregated in [`MemoryProtocolStore`] for
//! convenience. Operations borrow the capabilities they need as separate fields, so a single
//! device store can hand out several of them at once. Identity trust policy is
//! trust-on-first-use: the first key seen for an address is remembered, a different key is
//! untrusted until explicitly saved again.
use std::collections::HashMap;

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
use crate::traits::{
    Direction, IdentityChange, IdentityKeyStore, KyberPreKeyStore, PreKeyStore, SenderKeyStore,
    SessionStore, SignedPreKeyStore,
};

/// Trust-on-first-use identity store.
#[derive(Debug)]
pub struct MemoryIdentityStore {
    identity_key_pair: IdentityKeyPair,
    registration_id: u32,
    known_identities: HashMap<ProtocolAddress, IdentityKey>,
}

impl MemoryIdentityStore {
    pub fn new(identity_key_pair: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity_key_pair,
            registration_id,
            known_identities: HashMap::new(),
        }
    }
}

impl IdentityKeyStore for MemoryIdentityStore {
    fn identity_key_pair(&self) -> Result<IdentityKeyPair, ProtocolError> {
        Ok(self.identity_key_pair.clone())
    }

    fn local_registration_id(&self) -> Result<u32, ProtocolError> {
        Ok(self.registration_id)
    }

    fn save_identity(
        &mut self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
    ) -> Result<IdentityChange, ProtocolError> {
        match self.known_identities.insert(address.clone(), *identity) {
            Some(previous) if &previous != identity => Ok(IdentityChange::ReplacedExisting),
            _ => Ok(IdentityChange::NewOrUnchanged),
        }
    }

    fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        _direction: Direction,
    ) -> Result<bool, ProtocolError> {
        match self.known_identities.get(address) {
            Some(known) => Ok(known == identity),
            // Trust on first use.
            None => Ok(true),
        }
    }

    fn identity(&self, address: &ProtocolAddress) -> Result<Option<IdentityKey>, ProtocolError> {
        Ok(self.known_identities.get(address).copied())
    }
}

/// One-time pre-key store.
#[derive(Debug, Default)]
pub struct MemoryPreKeyStore {
    prekeys: HashMap<PreKeyId, PreKeyRecord>,
}

impl PreKeyStore for MemoryPreKeyStore {
    fn prekey(&self, id: PreKeyId) -> Result<PreKeyRecord, ProtocolError> {
        self.prekeys
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::InvalidPreKeyId { id })
    }

    fn save_prekey(&mut self, id: PreKeyId, record: &PreKeyRecord) -> Result<(), ProtocolError> {
        self.prekeys.insert(id, record.clone());
        Ok(())
    }

    fn contains_prekey(&self, id: PreKeyId) -> Result<bool, ProtocolError> {
        Ok(self.prekeys.contains_key(&id))
    }

    fn remove_prekey(&mut self, id: PreKeyId) -> Result<(), ProtocolError> {
        self.prekeys.remove(&id);
        Ok(())
    }

    fn all_prekeys(&self) -> Result<Vec<PreKeyRecord>, ProtocolError> {
        let mut records: Vec<PreKeyRecord> = self.prekeys.values().cloned().collect();
        records.sort_by_key(PreKeyRecord::id);
        Ok(records)
    }
}

/// Signed pre-key store.
#[derive(Debug, Default)]
pub struct MemorySignedPreKeyStore {
    signed_prekeys: HashMap<SignedPreKeyId, SignedPreKeyRecord>,
}

impl SignedPreKeyStore for MemorySignedPreKeyStore {
    fn signed_prekey(&self, id: SignedPreKeyId) -> Result<SignedPreKeyRecord, ProtocolError> {
        self.signed_prekeys
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::InvalidPreKeyId { id })
    }

    fn save_signed_prekey(
        &mut self,
        id: SignedPreKeyId,
        record: &SignedPreKeyRecord,
    ) -> Result<(), ProtocolError> {
        self.signed_prekeys.insert(id, record.clone());
        Ok(())
    }

    fn contains_signed_prekey(&self, id: SignedPreKeyId) -> Result<bool, ProtocolError> {
        Ok(self.signed_prekeys.contains_key(&id))
    }

    fn all_signed_prekeys(&self) -> Result<Vec<SignedPreKeyRecord>, ProtocolError> {
        let mut records: Vec<SignedPreKeyRecord> = self.signed_prekeys.values().cloned().collect();
        records.sort_by_key(SignedPreKeyRecord::id);
        Ok(records)
    }
}

/// Kyber pre-key store with one-time-use bookkeeping.
#[derive(Debug, Default)]
pub struct MemoryKyberPreKeyStore {
    kyber_prekeys: HashMap<KyberPreKeyId, KyberPreKeyRecord>,
    used_kyber_prekeys: HashMap<(KyberPreKeyId, SignedPreKeyId), PublicKey>,
}

impl KyberPreKeyStore for MemoryKyberPreKeyStore {
    fn kyber_prekey(&self, id: KyberPreKeyId) -> Result<KyberPreKeyRecord, ProtocolError> {
        self.kyber_prekeys
            .get(&id)
            .cloned()
            .ok_or(ProtocolError::InvalidPreKeyId { id })
    }

    fn save_kyber_prekey(
        &mut self,
        id: KyberPreKeyId,
        record: &KyberPreKeyRecord,
    ) -> Result<(), ProtocolError> {
        self.kyber_prekeys.insert(id, record.clone());
        Ok(())
    }

    fn contains_kyber_prekey(&self, id: KyberPreKeyId) -> Result<bool, ProtocolError> {
        Ok(self.kyber_prekeys.contains_key(&id))
    }

    fn all_kyber_prekeys(&self) -> Result<Vec<KyberPreKeyRecord>, ProtocolError> {
        let mut records: Vec<KyberPreKeyRecord> = self.kyber_prekeys.values().cloned().collect();
        records.sort_by_key(KyberPreKeyRecord::id);
        Ok(records)
    }

    fn mark_kyber_prekey_used(
        &mut self,
        kyber_prekey_id: KyberPreKeyId,
        signed_prekey_id: SignedPreKeyId,
        base_key: &PublicKey,
    ) -> Result<(), ProtocolError> {
        match self
            .used_kyber_prekeys
            .insert((kyber_prekey_id, signed_prekey_id), *base_key)
        {
            // A second use with a different base key means the one-time guarantee broke.
            Some(previous) if &previous != base_key => Err(ProtocolError::KyberPreKeyReused {
                kyber_prekey_id,
                signed_prekey_id,
            }),
            _ => Ok(()),
        }
    }
}

/// Session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: HashMap<ProtocolAddress, SessionRecord>,
}

impl SessionStore for MemorySessionStore {
    fn load_session(
        &self,
        address: &ProtocolAddress,
    ) -> Result<Option<SessionRecord>, ProtocolError> {
        Ok(self.sessions.get(address).cloned())
    }

    fn load_existing_sessions(
        &self,
        addresses: &[&ProtocolAddress],
    ) -> Result<Vec<SessionRecord>, ProtocolError> {
        addresses
            .iter()
            .map(|address| {
                self.sessions.get(address).cloned().ok_or_else(|| {
                    ProtocolError::SessionNotFound {
                        address: (*address).clone(),
                    }
                })
            })
            .collect()
    }

    fn sub_device_sessions(&self, name: &str) -> Result<Vec<DeviceId>, ProtocolError> {
        let mut devices: Vec<DeviceId> = self
            .sessions
            .keys()
            .filter(|address| address.name() == name && address.device_id().value() != 1)
            .map(ProtocolAddress::device_id)
            .collect();
        devices.sort();
        Ok(devices)
    }

    fn store_session(
        &mut self,
        address: &ProtocolAddress,
        record: &SessionRecord,
    ) -> Result<(), ProtocolError> {
        self.sessions.insert(address.clone(), record.clone());
        Ok(())
    }

    fn contains_session(&self, address: &ProtocolAddress) -> Result<bool, ProtocolError> {
        Ok(self.sessions.contains_key(address))
    }

    fn delete_session(&mut self, address: &ProtocolAddress) -> Result<(), ProtocolError> {
        self.sessions.remove(address);
        Ok(())
    }

    fn delete_all_sessions(&mut self, name: &str) -> Result<usize, ProtocolError> {
        let before = self.sessions.len();
        self.sessions.retain(|address, _| address.name() != name);
        Ok(before - self.sessions.len())
    }
}

/// Sender-key store.
#[derive(Debug, Default)]
pub struct MemorySenderKeyStore {
    sender_keys: HashMap<(ProtocolAddress, Uuid), SenderKeyRecord>,
}

impl SenderKeyStore for MemorySenderKeyStore {
    fn store_sender_key(
        &mut self,
        sender: &ProtocolAddress,
        distribution_id: Uuid,
        record: &SenderKeyRecord,
    ) -> Result<(), ProtocolError> {
        self.sender_keys
            .insert((sender.clone(), distribution_id), record.clone());
        Ok(())
    }

    fn load_sender_key(
        &self,
        sender: &ProtocolAddress,
        distribution_id: Uuid,
    ) -> Result<Option<SenderKeyRecord>, ProtocolError> {
        Ok(self
            .sender_keys
            .get(&(sender.clone(), distribution_id))
            .cloned())
    }
}

/// Every store capability of one device, as independently borrowable fields.
#[derive(Debug)]
pub struct MemoryProtocolStore {
    pub identity_store: MemoryIdentityStore,
    pub prekey_store: MemoryPreKeyStore,
    pub signed_prekey_store: MemorySignedPreKeyStore,
    pub kyber_prekey_store: MemoryKyberPreKeyStore,
    pub session_store: MemorySessionStore,
    pub sender_key_store: MemorySenderKeyStore,
}

impl MemoryProtocolStore {
    pub fn new(identity_key_pair: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity_store: MemoryIdentityStore::new(identity_key_pair, registration_id),
            prekey_store: MemoryPreKeyStore::default(),
            signed_prekey_store: MemorySignedPreKeyStore::default(),
            kyber_prekey_store: MemoryKyberPreKeyStore::default(),
            session_store: MemorySessionStore::default(),
            sender_key_store: MemorySenderKeyStore::default(),
        }
    }
}
