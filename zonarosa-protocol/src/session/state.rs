// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::crypto::kem::KemCiphertext;
use crate::crypto::x25519::{KeyPair, PublicKey};
use crate::identity::IdentityKey;
use crate::keys::{KyberPreKeyId, PreKeyId, SignedPreKeyId};
use crate::ratchet::{ChainKey, MessageKeys, RootKey};
use crate::session::{MAX_MESSAGE_KEYS, MAX_RECEIVER_CHAINS, MAX_UNACKNOWLEDGED_SESSION_AGE_MS};

/// Our half of the ratchet: the current ratchet key pair and the sending message chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SenderChain {
    ratchet_key: KeyPair,
    chain_key: ChainKey,
}

/// One remote ratchet generation: the peer's ratchet key, the receiving message chain, and
/// message keys cached for reordered delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ReceiverChain {
    ratchet_key: PublicKey,
    chain_key: ChainKey,
    cached_message_keys: VecDeque<MessageKeys>,
}

/// Handshake data repeated in every outgoing message until the peer acknowledges the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct PendingPreKey {
    pub(crate) prekey_id: Option<PreKeyId>,
    pub(crate) signed_prekey_id: SignedPreKeyId,
    pub(crate) kyber_prekey_id: KyberPreKeyId,
    pub(crate) kyber_ciphertext: KemCiphertext,
    pub(crate) base_key: PublicKey,
    pub(crate) created_at_ms: u64,
}

/// Ratchet state of one session generation.
///
/// Mutated by every encrypt and decrypt; the caller persists the surrounding
/// [`SessionRecord`](crate::SessionRecord) after the operation succeeds, never mid-step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    session_version: u8,
    local_identity: IdentityKey,
    remote_identity: IdentityKey,
    root_key: RootKey,
    sender_chain: Option<SenderChain>,
    receiver_chains: VecDeque<ReceiverChain>,
    previous_counter: u32,
    pending_prekey: Option<PendingPreKey>,
    alice_base_key: PublicKey,
    local_registration_id: u32,
    remote_registration_id: u32,
}

impl SessionState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_version: u8,
        local_identity: IdentityKey,
        remote_identity: IdentityKey,
        root_key: RootKey,
        alice_base_key: PublicKey,
        local_registration_id: u32,
        remote_registration_id: u32,
    ) -> Self {
        Self {
            session_version,
            local_identity,
            remote_identity,
            root_key,
            sender_chain: None,
            receiver_chains: VecDeque::new(),
            previous_counter: 0,
            pending_prekey: None,
            alice_base_key,
            local_registration_id,
            remote_registration_id,
        }
    }

    pub fn session_version(&self) -> u8 {
        self.session_version
    }

    pub fn local_identity(&self) -> &IdentityKey {
        &self.local_identity
    }

    pub fn remote_identity(&self) -> &IdentityKey {
        &self.remote_identity
    }

    /// The initiator's ephemeral base key of the handshake which created this state.
    ///
    /// Two peers agree on a session exactly when their current states carry the same base key,
    /// which is what the simultaneous-initiate convergence tests observe.
    pub fn alice_base_key(&self) -> &PublicKey {
        &self.alice_base_key
    }

    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    pub(crate) fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    pub(crate) fn set_root_key(&mut self, root_key: RootKey) {
        self.root_key = root_key;
    }

    // Sender chain.

    pub(crate) fn set_sender_chain(&mut self, ratchet_key: KeyPair, chain_key: ChainKey) {
        self.sender_chain = Some(SenderChain {
            ratchet_key,
            chain_key,
        });
    }

    /// Whether this state can encrypt right now: it needs a sending chain, and an initiating
    /// session whose handshake was never acknowledged must not have gone stale.
    pub(crate) fn has_usable_sender_chain(&self, now_ms: u64) -> bool {
        if self.sender_chain.is_none() {
            return false;
        }
        match &self.pending_prekey {
            Some(pending) => {
                now_ms.saturating_sub(pending.created_at_ms) <= MAX_UNACKNOWLEDGED_SESSION_AGE_MS
            }
            None => true,
        }
    }

    pub(crate) fn sender_ratchet_key_pair(&self) -> Option<&KeyPair> {
        self.sender_chain.as_ref().map(|chain| &chain.ratchet_key)
    }

    pub(crate) fn sender_chain_key(&self) -> Option<&ChainKey> {
        self.sender_chain.as_ref().map(|chain| &chain.chain_key)
    }

    pub(crate) fn advance_sender_chain(&mut self) {
        if let Some(chain) = self.sender_chain.as_mut() {
            chain.chain_key = chain.chain_key.next();
        }
    }

    pub(crate) fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    pub(crate) fn set_previous_counter(&mut self, counter: u32) {
        self.previous_counter = counter;
    }

    // Receiver chains.

    pub(crate) fn receiver_chain_key(&self, their_ratchet_key: &PublicKey) -> Option<ChainKey> {
        self.receiver_chains
            .iter()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)
            .map(|chain| chain.chain_key.clone())
    }

    /// Registers a new remote ratchet generation. Chains beyond the bound are dropped along
    /// with any message keys still cached on them.
    pub(crate) fn add_receiver_chain(&mut self, their_ratchet_key: PublicKey, chain_key: ChainKey) {
        self.receiver_chains.push_front(ReceiverChain {
            ratchet_key: their_ratchet_key,
            chain_key,
            cached_message_keys: VecDeque::new(),
        });
        self.receiver_chains.truncate(MAX_RECEIVER_CHAINS);
    }

    pub(crate) fn set_receiver_chain_key(
        &mut self,
        their_ratchet_key: &PublicKey,
        chain_key: ChainKey,
    ) {
        if let Some(chain) = self
            .receiver_chains
            .iter_mut()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)
        {
            chain.chain_key = chain_key;
        }
    }

    /// Caches a skipped message key for later out-of-order delivery, evicting the oldest one
    /// once the bound is reached.
    pub(crate) fn cache_message_keys(
        &mut self,
        their_ratchet_key: &PublicKey,
        message_keys: MessageKeys,
    ) {
        if let Some(chain) = self
            .receiver_chains
            .iter_mut()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)
        {
            chain.cached_message_keys.push_back(message_keys);
            if chain.cached_message_keys.len() > MAX_MESSAGE_KEYS {
                chain.cached_message_keys.pop_front();
            }
        }
    }

    /// Takes the cached message key for `counter`, consuming it. `None` means the key was
    /// never cached or has already been used, both of which the caller treats as a duplicate.
    pub(crate) fn take_message_keys(
        &mut self,
        their_ratchet_key: &PublicKey,
        counter: u32,
    ) -> Option<MessageKeys> {
        let chain = self
            .receiver_chains
            .iter_mut()
            .find(|chain| &chain.ratchet_key == their_ratchet_key)?;
        let position = chain
            .cached_message_keys
            .iter()
            .position(|keys| keys.counter() == counter)?;
        chain.cached_message_keys.remove(position)
    }

    // Pending handshake.

    pub(crate) fn set_pending_prekey(&mut self, pending: PendingPreKey) {
        self.pending_prekey = Some(pending);
    }

    pub(crate) fn pending_prekey(&self) -> Option<&PendingPreKey> {
        self.pending_prekey.as_ref()
    }

    /// Called on the first successful decrypt within this state: the peer demonstrably holds
    /// the session, so the handshake no longer needs to ride along on outgoing messages.
    pub(crate) fn clear_pending_prekey(&mut self) {
        self.pending_prekey = None;
    }
}
