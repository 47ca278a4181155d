// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-message double-ratchet encryption and decryption.
//!
//! Both operations follow a strict read-modify-write discipline: the session record is loaded,
//! transformed on a copy, and committed to the store exactly once after all fallible work
//! succeeded. A failed operation leaves the store untouched. Note that a decrypt which
//! succeeded but whose commit was lost cannot safely be retried: the message key was consumed,
//! so a naive retry reports a duplicate. Callers must treat "decrypted but not persisted"
//! differently from "never decrypted".
use tracing::{debug, trace};

use crate::address::ProtocolAddress;
use crate::crypto::Rng;
use crate::crypto::aead::{aead_decrypt, aead_encrypt};
use crate::crypto::x25519::{KeyPair, PublicKey};
use crate::error::ProtocolError;
use crate::identity::IdentityKey;
use crate::messages::{CiphertextMessage, PreKeyMessage, RatchetMessage};
use crate::ratchet::{ChainKey, MessageKeys};
use crate::session::builder::process_prekey_message;
use crate::session::{MAX_FORWARD_JUMPS, SessionRecord, SessionState};
use crate::traits::{
    Direction, IdentityKeyStore, KyberPreKeyStore, PreKeyStore, SessionStore, SignedPreKeyStore,
};

/// Encrypts `plaintext` to the session with `remote_address`.
///
/// While the peer has not acknowledged the session, the result is a handshake-carrying
/// [`PreKeyMessage`]; afterwards a plain [`RatchetMessage`]. Fails with
/// [`ProtocolError::SessionNotFound`] when no usable sending chain exists, including the case
/// of an initiating session whose handshake went unacknowledged for too long; the caller must
/// then fetch a fresh pre-key bundle.
pub fn encrypt_message(
    plaintext: &[u8],
    remote_address: &ProtocolAddress,
    session_store: &mut dyn SessionStore,
    identity_store: &mut dyn IdentityKeyStore,
    now_ms: u64,
) -> Result<CiphertextMessage, ProtocolError> {
    let mut record = session_store
        .load_session(remote_address)?
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })?;

    let state = record
        .session_state_mut()
        .filter(|state| state.has_usable_sender_chain(now_ms))
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })?;

    let their_identity = *state.remote_identity();
    if !identity_store.is_trusted_identity(remote_address, &their_identity, Direction::Sending)? {
        return Err(ProtocolError::UntrustedIdentity {
            address: remote_address.clone(),
        });
    }

    let chain_key = state
        .sender_chain_key()
        .cloned()
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })?;
    let message_keys = chain_key.message_keys();
    let ratchet_key = *state
        .sender_ratchet_key_pair()
        .map(KeyPair::public_key)
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })?;

    let aad = ratchet_message_aad(
        state.session_version(),
        state.local_identity(),
        &their_identity,
        &ratchet_key,
        chain_key.index(),
    );
    let ciphertext = aead_encrypt(message_keys.key(), message_keys.nonce(), plaintext, &aad)?;

    let message = RatchetMessage::new(
        state.session_version(),
        ratchet_key,
        chain_key.index(),
        state.previous_counter(),
        ciphertext,
    )?;

    let message = match state.pending_prekey() {
        Some(pending) => CiphertextMessage::PreKey(PreKeyMessage::new(
            state.session_version(),
            state.local_registration_id(),
            pending.prekey_id,
            pending.signed_prekey_id,
            pending.kyber_prekey_id,
            pending.kyber_ciphertext.clone(),
            pending.base_key,
            *state.local_identity(),
            message,
        )?),
        None => CiphertextMessage::Ratchet(message),
    };

    state.advance_sender_chain();
    session_store.store_session(remote_address, &record)?;

    trace!(
        target: "protocol::session",
        address = %remote_address,
        counter = chain_key.index(),
        "message encrypted"
    );
    Ok(message)
}

/// Decrypts an ordinary ratchet message from `remote_address`.
///
/// The current session state is tried first; on authentication failure every archived state is
/// tried in recency order, and whichever state authenticates the message is promoted to
/// current. This is what converges the simultaneous-initiate race. Duplicates abort the search
/// immediately and are never retried.
pub fn decrypt_message(
    message: &RatchetMessage,
    remote_address: &ProtocolAddress,
    session_store: &mut dyn SessionStore,
    identity_store: &mut dyn IdentityKeyStore,
    rng: &Rng,
) -> Result<Vec<u8>, ProtocolError> {
    let mut record = session_store
        .load_session(remote_address)?
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })?;

    let plaintext = decrypt_message_with_record(remote_address, &mut record, message, rng)?;

    let their_identity = *record
        .session_state()
        .ok_or(ProtocolError::InvalidMessage {
            reason: "record lost its current state",
        })?
        .remote_identity();
    if !identity_store.is_trusted_identity(remote_address, &their_identity, Direction::Receiving)? {
        return Err(ProtocolError::UntrustedIdentity {
            address: remote_address.clone(),
        });
    }
    identity_store.save_identity(remote_address, &their_identity)?;
    session_store.store_session(remote_address, &record)?;

    Ok(plaintext)
}

/// Decrypts a handshake-carrying message, establishing the session as a side effect when it
/// does not exist yet.
///
/// The referenced one-time pre-key is removed only after the decrypt succeeded and the session
/// was committed; the Kyber pre-key is marked used with reuse detection during processing.
pub fn decrypt_prekey_message(
    message: &PreKeyMessage,
    remote_address: &ProtocolAddress,
    session_store: &mut dyn SessionStore,
    identity_store: &mut dyn IdentityKeyStore,
    prekey_store: &mut dyn PreKeyStore,
    signed_prekey_store: &mut dyn SignedPreKeyStore,
    kyber_prekey_store: &mut dyn KyberPreKeyStore,
    rng: &Rng,
) -> Result<Vec<u8>, ProtocolError> {
    let mut record = session_store
        .load_session(remote_address)?
        .unwrap_or_else(SessionRecord::new_fresh);

    let used_prekey_id = process_prekey_message(
        &mut record,
        remote_address,
        message,
        identity_store,
        prekey_store,
        signed_prekey_store,
        kyber_prekey_store,
    )?;

    let plaintext = decrypt_message_with_record(remote_address, &mut record, message.message(), rng)?;

    identity_store.save_identity(remote_address, message.identity_key())?;
    session_store.store_session(remote_address, &record)?;

    if let Some(prekey_id) = used_prekey_id {
        prekey_store.remove_prekey(prekey_id)?;
        debug!(
            target: "protocol::session",
            address = %remote_address,
            prekey_id,
            "one-time pre-key consumed"
        );
    }

    Ok(plaintext)
}

/// Registration id the peer reported during the handshake.
pub fn remote_registration_id(
    remote_address: &ProtocolAddress,
    session_store: &dyn SessionStore,
) -> Result<u32, ProtocolError> {
    let record = session_store
        .load_session(remote_address)?
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })?;
    record
        .session_state()
        .map(SessionState::remote_registration_id)
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })
}

/// Negotiated protocol version of the current session.
pub fn session_version(
    remote_address: &ProtocolAddress,
    session_store: &dyn SessionStore,
) -> Result<u8, ProtocolError> {
    let record = session_store
        .load_session(remote_address)?
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })?;
    record
        .session_state()
        .map(SessionState::session_version)
        .ok_or_else(|| ProtocolError::SessionNotFound {
            address: remote_address.clone(),
        })
}

fn decrypt_message_with_record(
    remote_address: &ProtocolAddress,
    record: &mut SessionRecord,
    message: &RatchetMessage,
    rng: &Rng,
) -> Result<Vec<u8>, ProtocolError> {
    // The current state almost always matches; work on a copy so a non-matching state leaves
    // the record untouched.
    if let Some(state) = record.session_state() {
        let mut updated = state.clone();
        match decrypt_message_with_state(&mut updated, message, rng) {
            Ok(plaintext) => {
                record.set_session_state(updated);
                return Ok(plaintext);
            }
            Err(err @ ProtocolError::DuplicateMessage { .. }) => return Err(err),
            Err(_) => {
                trace!(
                    target: "protocol::session",
                    address = %remote_address,
                    "current session state failed to authenticate message, trying archived states"
                );
            }
        }
    }

    for index in 0..record.previous_len() {
        let Some(state) = record.previous_state(index) else {
            break;
        };
        let mut updated = state.clone();
        match decrypt_message_with_state(&mut updated, message, rng) {
            Ok(plaintext) => {
                debug!(
                    target: "protocol::session",
                    address = %remote_address,
                    "archived session state authenticated message, promoting it"
                );
                record.promote_old_state(index, updated);
                return Ok(plaintext);
            }
            Err(err @ ProtocolError::DuplicateMessage { .. }) => return Err(err),
            Err(_) => {}
        }
    }

    Err(ProtocolError::InvalidMessage {
        reason: "message does not authenticate under any session state",
    })
}

fn decrypt_message_with_state(
    state: &mut SessionState,
    message: &RatchetMessage,
    rng: &Rng,
) -> Result<Vec<u8>, ProtocolError> {
    let their_ratchet_key = *message.ratchet_key();
    let chain_key = get_or_create_receiver_chain(state, &their_ratchet_key, rng)?;
    let message_keys = message_keys_for(state, &their_ratchet_key, chain_key, message.counter())?;

    let aad = ratchet_message_aad(
        message.version(),
        state.remote_identity(),
        state.local_identity(),
        &their_ratchet_key,
        message.counter(),
    );
    let plaintext = aead_decrypt(
        message_keys.key(),
        message_keys.nonce(),
        message.ciphertext(),
        &aad,
    )
    .map_err(|_| ProtocolError::InvalidMessage {
        reason: "ciphertext failed authentication",
    })?;

    // The peer demonstrably owns the session now; stop sending the handshake along.
    state.clear_pending_prekey();
    Ok(plaintext)
}

/// Finds the receiving chain for `their_ratchet_key`, performing a Diffie-Hellman ratchet step
/// if the key is new: the root chain steps once for the new receiving chain and once more for
/// our replacement sending chain under a fresh ratchet key.
fn get_or_create_receiver_chain(
    state: &mut SessionState,
    their_ratchet_key: &PublicKey,
    rng: &Rng,
) -> Result<ChainKey, ProtocolError> {
    if let Some(chain_key) = state.receiver_chain_key(their_ratchet_key) {
        return Ok(chain_key);
    }

    let our_ratchet = state
        .sender_ratchet_key_pair()
        .cloned()
        .ok_or(ProtocolError::InvalidMessage {
            reason: "session has no sender chain",
        })?;
    let (receiver_root, receiver_chain) = state
        .root_key()
        .create_chain(their_ratchet_key, our_ratchet.secret_key())?;

    let new_ratchet = KeyPair::generate(rng)?;
    let (sender_root, sender_chain) =
        receiver_root.create_chain(their_ratchet_key, new_ratchet.secret_key())?;

    let previous_counter = state.sender_chain_key().map(ChainKey::index).unwrap_or(0);
    state.set_previous_counter(previous_counter);
    state.set_root_key(sender_root);
    state.add_receiver_chain(*their_ratchet_key, receiver_chain.clone());
    state.set_sender_chain(new_ratchet, sender_chain);

    trace!(target: "protocol::session", "diffie-hellman ratchet step");
    Ok(receiver_chain)
}

/// Ratchets the receiving chain to the message's counter.
///
/// A counter behind the chain is served from the cache of skipped keys, or rejected as a
/// duplicate if its key was already consumed. A counter ahead advances the chain, caching
/// every skipped key up to the bounded window.
fn message_keys_for(
    state: &mut SessionState,
    their_ratchet_key: &PublicKey,
    chain_key: ChainKey,
    counter: u32,
) -> Result<MessageKeys, ProtocolError> {
    if counter < chain_key.index() {
        return state
            .take_message_keys(their_ratchet_key, counter)
            .ok_or(ProtocolError::DuplicateMessage { counter });
    }

    if counter - chain_key.index() > MAX_FORWARD_JUMPS {
        return Err(ProtocolError::InvalidMessage {
            reason: "message counter jumps too far ahead",
        });
    }

    let mut chain_key = chain_key;
    while chain_key.index() < counter {
        state.cache_message_keys(their_ratchet_key, chain_key.message_keys());
        chain_key = chain_key.next();
    }
    state.set_receiver_chain_key(their_ratchet_key, chain_key.next());
    Ok(chain_key.message_keys())
}

/// Additional data binding a ratchet message to both identities and its header.
fn ratchet_message_aad(
    version: u8,
    sender_identity: &IdentityKey,
    receiver_identity: &IdentityKey,
    ratchet_key: &PublicKey,
    counter: u32,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + 32 + 32 + 32 + 4);
    aad.push(version);
    aad.extend_from_slice(sender_identity.public_key().as_bytes());
    aad.extend_from_slice(receiver_identity.public_key().as_bytes());
    aad.extend_from_slice(ratchet_key.as_bytes());
    aad.extend_from_slice(&counter.to_be_bytes());
    aad
}
