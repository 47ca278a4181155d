// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group message encryption and decryption against sender-key chains.
use tracing::{debug, trace};
use uuid::Uuid;

use crate::address::ProtocolAddress;
use crate::crypto::aead::{aead_decrypt, aead_encrypt};
use crate::crypto::x25519::KeyPair;
use crate::crypto::{Rng, Secret};
use crate::error::ProtocolError;
use crate::group::{MAX_SENDER_FORWARD_JUMPS, SenderKeyRecord, SenderKeyState};
use crate::messages::{
    CIPHERTEXT_MESSAGE_CURRENT_VERSION, CiphertextMessage, SenderKeyDistributionMessage,
    SenderKeyMessage,
};
use crate::ratchet::{ChainKey, MessageKeys};
use crate::traits::SenderKeyStore;

/// Creates (or re-advertises) our sender-key chain for `(sender, distribution_id)` and packages
/// it for out-of-band distribution to the group.
///
/// First call generates a fresh chain: random chain id, random seed and a new signature key
/// pair. Subsequent calls advertise the current chain state, so a member joining late starts
/// at the current iteration and cannot read older messages.
pub fn create_sender_key_distribution_message(
    sender: &ProtocolAddress,
    distribution_id: Uuid,
    store: &mut dyn SenderKeyStore,
    rng: &Rng,
) -> Result<SenderKeyDistributionMessage, ProtocolError> {
    let mut record = store
        .load_sender_key(sender, distribution_id)?
        .unwrap_or_else(SenderKeyRecord::new_fresh);

    if record.state().is_none() {
        let chain_id = rng.random_u32()?;
        let seed = Secret::from_bytes(rng.random_array()?);
        let signing = KeyPair::generate(rng)?;
        record.add_state(SenderKeyState::new(
            chain_id,
            ChainKey::new(seed, 0),
            *signing.public_key(),
            Some(signing.secret_key().clone()),
        ));
        store.store_sender_key(sender, distribution_id, &record)?;
        debug!(
            target: "protocol::group",
            sender = %sender,
            %distribution_id,
            chain_id,
            "created sender key chain"
        );
    }

    let state = record
        .state()
        .ok_or(ProtocolError::SenderKeyNotFound { distribution_id })?;

    Ok(SenderKeyDistributionMessage::new(
        CIPHERTEXT_MESSAGE_CURRENT_VERSION,
        distribution_id,
        state.chain_id(),
        state.chain_key().index(),
        state.chain_key().key().clone(),
        *state.signing_public(),
    )?)
}

/// Stores the chain a group member distributed to us, keyed by their address and the
/// distribution id.
pub fn process_sender_key_distribution_message(
    sender: &ProtocolAddress,
    message: &SenderKeyDistributionMessage,
    store: &mut dyn SenderKeyStore,
) -> Result<(), ProtocolError> {
    let mut record = store
        .load_sender_key(sender, message.distribution_id())?
        .unwrap_or_else(SenderKeyRecord::new_fresh);

    record.add_state(SenderKeyState::new(
        message.chain_id(),
        ChainKey::new(message.chain_key().clone(), message.iteration()),
        *message.signing_key(),
        None,
    ));
    store.store_sender_key(sender, message.distribution_id(), &record)?;

    debug!(
        target: "protocol::group",
        sender = %sender,
        distribution_id = %message.distribution_id(),
        chain_id = message.chain_id(),
        "processed sender key distribution"
    );
    Ok(())
}

/// Encrypts a group message from our chain for `(sender, distribution_id)`.
///
/// Ratchets the chain forward one step and signs the result with the chain's signature key.
/// Fails with [`ProtocolError::SenderKeyNotFound`] when the chain was never created here.
pub fn group_encrypt(
    sender: &ProtocolAddress,
    distribution_id: Uuid,
    plaintext: &[u8],
    store: &mut dyn SenderKeyStore,
    rng: &Rng,
) -> Result<CiphertextMessage, ProtocolError> {
    let mut record = store
        .load_sender_key(sender, distribution_id)?
        .ok_or(ProtocolError::SenderKeyNotFound { distribution_id })?;
    let state = record
        .state_mut()
        .ok_or(ProtocolError::SenderKeyNotFound { distribution_id })?;

    // Only our own chains carry the signature secret; without it this store only ever
    // received the chain and cannot send.
    let signing_secret = state
        .signing_secret()
        .cloned()
        .ok_or(ProtocolError::SenderKeyNotFound { distribution_id })?;

    let chain_key = state.chain_key().clone();
    let message_keys = chain_key.message_keys();

    let aad = sender_key_aad(distribution_id, state.chain_id(), chain_key.index());
    let ciphertext = aead_encrypt(message_keys.key(), message_keys.nonce(), plaintext, &aad)?;

    let message = SenderKeyMessage::new(
        CIPHERTEXT_MESSAGE_CURRENT_VERSION,
        distribution_id,
        state.chain_id(),
        chain_key.index(),
        ciphertext,
        &signing_secret,
        rng,
    )?;

    state.advance_chain();
    store.store_sender_key(sender, distribution_id, &record)?;

    trace!(
        target: "protocol::group",
        %distribution_id,
        iteration = chain_key.index(),
        "group message encrypted"
    );
    Ok(CiphertextMessage::SenderKey(message))
}

/// Decrypts a group message using the chain previously distributed by `sender`.
///
/// Verifies the message signature against the chain's signature key before touching the
/// ratchet; then ratchets the receiving copy of the chain to the claimed iteration with the
/// same bounded reordering tolerance as the session cipher. Iterations whose key was already
/// consumed are duplicates.
pub fn group_decrypt(
    message: &SenderKeyMessage,
    sender: &ProtocolAddress,
    store: &mut dyn SenderKeyStore,
) -> Result<Vec<u8>, ProtocolError> {
    let distribution_id = message.distribution_id();
    let mut record = store
        .load_sender_key(sender, distribution_id)?
        .ok_or(ProtocolError::SenderKeyNotFound { distribution_id })?;
    let state = record
        .state_for_chain_id_mut(message.chain_id())
        .ok_or(ProtocolError::NoSenderKeyState {
            distribution_id,
            chain_id: message.chain_id(),
        })?;

    message.verify_signature(state.signing_public())?;

    let message_keys = sender_message_keys_for(state, message.iteration())?;
    let aad = sender_key_aad(distribution_id, message.chain_id(), message.iteration());
    let plaintext = aead_decrypt(
        message_keys.key(),
        message_keys.nonce(),
        message.ciphertext(),
        &aad,
    )
    .map_err(|_| ProtocolError::InvalidMessage {
        reason: "group ciphertext failed authentication",
    })?;

    store.store_sender_key(sender, distribution_id, &record)?;
    Ok(plaintext)
}

/// Ratchets a receiving chain copy to `iteration`, caching skipped keys up to the bounded
/// window and consuming the matching key exactly once.
fn sender_message_keys_for(
    state: &mut SenderKeyState,
    iteration: u32,
) -> Result<MessageKeys, ProtocolError> {
    let chain_key = state.chain_key().clone();

    if iteration < chain_key.index() {
        return state
            .take_message_keys(iteration)
            .ok_or(ProtocolError::DuplicateMessage { counter: iteration });
    }

    if iteration - chain_key.index() > MAX_SENDER_FORWARD_JUMPS {
        return Err(ProtocolError::InvalidMessage {
            reason: "group message iteration jumps too far ahead",
        });
    }

    let mut chain_key = chain_key;
    while chain_key.index() < iteration {
        state.cache_message_keys(chain_key.message_keys());
        chain_key = chain_key.next();
    }
    state.set_chain_key(chain_key.next());
    Ok(chain_key.message_keys())
}

/// Additional data binding a group ciphertext to its chain position.
fn sender_key_aad(distribution_id: Uuid, chain_id: u32, iteration: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(16 + 4 + 4);
    aad.extend_from_slice(distribution_id.as_bytes());
    aad.extend_from_slice(&chain_id.to_be_bytes());
    aad.extend_from_slice(&iteration.to_be_bytes());
    aad
}
