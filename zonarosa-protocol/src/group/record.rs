// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::group::{MAX_SENDER_KEY_STATES, MAX_SENDER_MESSAGE_KEYS};
use crate::ratchet::{ChainKey, MessageKeys};

/// One generation of a sender's group chain.
///
/// Our own chains carry the signature secret; chains received from other members only hold
/// the public half, which is all that verification needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SenderKeyState {
    chain_id: u32,
    chain_key: ChainKey,
    signing_public: PublicKey,
    signing_secret: Option<SecretKey>,
    cached_message_keys: VecDeque<MessageKeys>,
}

impl SenderKeyState {
    pub(crate) fn new(
        chain_id: u32,
        chain_key: ChainKey,
        signing_public: PublicKey,
        signing_secret: Option<SecretKey>,
    ) -> Self {
        Self {
            chain_id,
            chain_key,
            signing_public,
            signing_secret,
            cached_message_keys: VecDeque::new(),
        }
    }

    pub(crate) fn chain_id(&self) -> u32 {
        self.chain_id
    }

    pub(crate) fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    pub(crate) fn set_chain_key(&mut self, chain_key: ChainKey) {
        self.chain_key = chain_key;
    }

    pub(crate) fn advance_chain(&mut self) {
        self.chain_key = self.chain_key.next();
    }

    pub(crate) fn signing_public(&self) -> &PublicKey {
        &self.signing_public
    }

    pub(crate) fn signing_secret(&self) -> Option<&SecretKey> {
        self.signing_secret.as_ref()
    }

    /// Caches a skipped message key, evicting the oldest once the bound is reached.
    pub(crate) fn cache_message_keys(&mut self, message_keys: MessageKeys) {
        self.cached_message_keys.push_back(message_keys);
        if self.cached_message_keys.len() > MAX_SENDER_MESSAGE_KEYS {
            self.cached_message_keys.pop_front();
        }
    }

    /// Takes the cached key for `iteration`, consuming it.
    pub(crate) fn take_message_keys(&mut self, iteration: u32) -> Option<MessageKeys> {
        let position = self
            .cached_message_keys
            .iter()
            .position(|keys| keys.counter() == iteration)?;
        self.cached_message_keys.remove(position)
    }
}

/// All chain generations known for one (sender address, distribution id) pair.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SenderKeyRecord {
    states: VecDeque<SenderKeyState>,
}

impl SenderKeyRecord {
    pub fn new_fresh() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub(crate) fn state(&self) -> Option<&SenderKeyState> {
        self.states.front()
    }

    pub(crate) fn state_mut(&mut self) -> Option<&mut SenderKeyState> {
        self.states.front_mut()
    }

    pub(crate) fn state_for_chain_id_mut(&mut self, chain_id: u32) -> Option<&mut SenderKeyState> {
        self.states
            .iter_mut()
            .find(|state| state.chain_id() == chain_id)
    }

    /// Installs a chain generation as the newest one. A re-distributed chain replaces the
    /// generation with the same chain id instead of duplicating it.
    pub(crate) fn add_state(&mut self, state: SenderKeyState) {
        self.states
            .retain(|existing| existing.chain_id() != state.chain_id());
        self.states.push_front(state);
        self.states.truncate(MAX_SENDER_KEY_STATES);
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}
