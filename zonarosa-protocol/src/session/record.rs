// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cbor::{DecodeError, EncodeError, decode_cbor, encode_cbor};
use crate::crypto::x25519::PublicKey;
use crate::session::{MAX_ARCHIVED_STATES, SessionState};

/// Current ratchet state of a session plus a bounded history of archived generations.
///
/// Archived states exist to resolve the simultaneous-initiate race: when both peers build
/// sessions to each other concurrently, each side ends up with two live handshakes, and
/// whichever one authenticates an incoming message gets promoted back to current. The history
/// is strictly bounded; it is a convergence aid, not an archive of record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    current: Option<SessionState>,
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    pub(crate) fn new(state: SessionState) -> Self {
        Self {
            current: Some(state),
            previous: VecDeque::new(),
        }
    }

    pub fn new_fresh() -> Self {
        Self::default()
    }

    pub fn session_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub(crate) fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    pub(crate) fn set_session_state(&mut self, state: SessionState) {
        self.current = Some(state);
    }

    /// Moves the current state into the archive without installing a replacement.
    pub fn archive_current_state(&mut self) {
        if let Some(state) = self.current.take() {
            self.previous.push_front(state);
            self.previous.truncate(MAX_ARCHIVED_STATES);
        }
    }

    /// Installs `state` as current, archiving whatever was current before.
    pub(crate) fn promote_state(&mut self, state: SessionState) {
        self.archive_current_state();
        self.current = Some(state);
    }

    /// Moves the archived state at `index` to current (in its `updated` form), archiving the
    /// old current.
    pub(crate) fn promote_old_state(&mut self, index: usize, updated: SessionState) {
        self.previous.remove(index);
        self.promote_state(updated);
    }

    pub(crate) fn previous_state(&self, index: usize) -> Option<&SessionState> {
        self.previous.get(index)
    }

    pub(crate) fn previous_len(&self) -> usize {
        self.previous.len()
    }

    /// Whether any state, current or archived, stems from the handshake identified by
    /// `base_key`. Used to recognize retransmitted handshake messages.
    pub fn has_session_state(&self, version: u8, base_key: &PublicKey) -> bool {
        self.current
            .iter()
            .chain(self.previous.iter())
            .any(|state| {
                state.session_version() == version && state.alice_base_key() == base_key
            })
    }

    /// Promotes the state created by the handshake `base_key`, if present and not already
    /// current. Returns whether such a state exists at all.
    pub(crate) fn promote_matching_state(&mut self, version: u8, base_key: &PublicKey) -> bool {
        if let Some(state) = &self.current {
            if state.session_version() == version && state.alice_base_key() == base_key {
                return true;
            }
        }
        if let Some(index) = self.previous.iter().position(|state| {
            state.session_version() == version && state.alice_base_key() == base_key
        }) {
            if let Some(state) = self.previous.remove(index) {
                self.promote_state(state);
            }
            return true;
        }
        false
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        encode_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode_cbor(bytes)
    }
}
