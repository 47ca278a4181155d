// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session establishment: the post-quantum-augmented extended Diffie-Hellman handshake.
//!
//! The initiator combines four classical agreements (identity and ephemeral base key against
//! the peer's signed and one-time pre-keys) with a Kyber encapsulation; the responder mirrors
//! the combination from the handshake data carried in the first message. Both sides end up
//! with the same root key without a round trip.
use tracing::debug;

use crate::address::ProtocolAddress;
use crate::crypto::hkdf::hkdf;
use crate::crypto::kem::{kem_decapsulate, kem_encapsulate};
use crate::crypto::x25519::KeyPair;
use crate::crypto::{Rng, Secret};
use crate::error::ProtocolError;
use crate::identity::IdentityKey;
use crate::keys::{PreKeyBundle, PreKeyId};
use crate::messages::{CIPHERTEXT_MESSAGE_CURRENT_VERSION, PreKeyMessage};
use crate::ratchet::{ChainKey, RootKey};
use crate::session::state::PendingPreKey;
use crate::session::{SessionRecord, SessionState};
use crate::traits::{
    Direction, IdentityKeyStore, KyberPreKeyStore, PreKeyStore, SessionStore, SignedPreKeyStore,
};

/// Domain separation for the handshake's root derivation.
const HANDSHAKE_INFO: &[u8] = b"ZonaRosaHandshake";

/// Leading discriminator mixed into the handshake secrets.
const DISCRIMINATOR: [u8; 32] = [0xFF; 32];

/// Processes a remote device's pre-key bundle and installs a fresh initiating session.
///
/// Validates the bundle's signatures against its identity key and checks that identity is
/// trusted for sending before any key material is touched. The previous session state, if any,
/// is archived, not deleted; the new state carries the handshake until the peer acknowledges.
pub fn process_prekey_bundle(
    remote_address: &ProtocolAddress,
    bundle: &PreKeyBundle,
    session_store: &mut dyn SessionStore,
    identity_store: &mut dyn IdentityKeyStore,
    now_ms: u64,
    rng: &Rng,
) -> Result<(), ProtocolError> {
    let their_identity = *bundle.identity_key();
    if !identity_store.is_trusted_identity(remote_address, &their_identity, Direction::Sending)? {
        return Err(ProtocolError::UntrustedIdentity {
            address: remote_address.clone(),
        });
    }
    bundle.verify_signatures()?;

    let our_identity = identity_store.identity_key_pair()?;

    // Ephemeral base key of this handshake. Its public half identifies the session across both
    // peers and rides along in every outgoing message until acknowledged.
    let base_key = KeyPair::generate(rng)?;

    let mut secrets = Vec::with_capacity(32 * 6);
    secrets.extend_from_slice(&DISCRIMINATOR);
    secrets.extend_from_slice(
        our_identity
            .secret_key()
            .calculate_agreement(bundle.signed_prekey())?
            .as_bytes(),
    );
    secrets.extend_from_slice(
        base_key
            .secret_key()
            .calculate_agreement(their_identity.public_key())?
            .as_bytes(),
    );
    secrets.extend_from_slice(
        base_key
            .secret_key()
            .calculate_agreement(bundle.signed_prekey())?
            .as_bytes(),
    );
    if let Some((_, onetime_prekey)) = bundle.prekey() {
        secrets.extend_from_slice(
            base_key
                .secret_key()
                .calculate_agreement(onetime_prekey)?
                .as_bytes(),
        );
    }
    let (kyber_ciphertext, kyber_shared) = kem_encapsulate(bundle.kyber_prekey())?;
    secrets.extend_from_slice(kyber_shared.as_bytes());

    let (root_key, receiver_chain) = derive_root(&secrets);

    // The initial receiving chain hangs off the peer's signed pre-key; our first sending chain
    // comes from one root step with a fresh ratchet key.
    let sending_ratchet = KeyPair::generate(rng)?;
    let (root_key, sender_chain) =
        root_key.create_chain(bundle.signed_prekey(), sending_ratchet.secret_key())?;

    let mut state = SessionState::new(
        CIPHERTEXT_MESSAGE_CURRENT_VERSION,
        *our_identity.identity_key(),
        their_identity,
        root_key,
        *base_key.public_key(),
        identity_store.local_registration_id()?,
        bundle.registration_id(),
    );
    state.add_receiver_chain(*bundle.signed_prekey(), receiver_chain);
    state.set_sender_chain(sending_ratchet, sender_chain);
    state.set_pending_prekey(PendingPreKey {
        prekey_id: bundle.prekey().map(|(id, _)| *id),
        signed_prekey_id: bundle.signed_prekey_id(),
        kyber_prekey_id: bundle.kyber_prekey_id(),
        kyber_ciphertext,
        base_key: *base_key.public_key(),
        created_at_ms: now_ms,
    });

    let mut record = session_store
        .load_session(remote_address)?
        .unwrap_or_else(SessionRecord::new_fresh);
    record.promote_state(state);

    identity_store.save_identity(remote_address, &their_identity)?;
    session_store.store_session(remote_address, &record)?;

    debug!(
        target: "protocol::session",
        address = %remote_address,
        "initiating session established from pre-key bundle"
    );
    Ok(())
}

/// Responder half of the handshake, driven by
/// [`decrypt_prekey_message`](crate::decrypt_prekey_message).
///
/// Returns the id of the consumed one-time pre-key, if any, so the caller can remove it after
/// the first decrypt went through. A handshake whose base key already produced a session state
/// is a retransmission: the matching state is promoted and nothing is consumed.
pub(crate) fn process_prekey_message(
    record: &mut SessionRecord,
    remote_address: &ProtocolAddress,
    message: &PreKeyMessage,
    identity_store: &mut dyn IdentityKeyStore,
    prekey_store: &mut dyn PreKeyStore,
    signed_prekey_store: &mut dyn SignedPreKeyStore,
    kyber_prekey_store: &mut dyn KyberPreKeyStore,
) -> Result<Option<PreKeyId>, ProtocolError> {
    let their_identity: IdentityKey = *message.identity_key();
    if !identity_store.is_trusted_identity(remote_address, &their_identity, Direction::Receiving)? {
        return Err(ProtocolError::UntrustedIdentity {
            address: remote_address.clone(),
        });
    }

    if record.promote_matching_state(message.version(), message.base_key()) {
        debug!(
            target: "protocol::session",
            address = %remote_address,
            "handshake retransmission for known session, nothing consumed"
        );
        return Ok(None);
    }

    let our_identity = identity_store.identity_key_pair()?;
    let signed_prekey = signed_prekey_store
        .signed_prekey(message.signed_prekey_id())?
        .key_pair()?;
    let kyber_prekey = kyber_prekey_store
        .kyber_prekey(message.kyber_prekey_id())?
        .key_pair()?;
    let onetime_prekey = match message.prekey_id() {
        Some(id) => Some(prekey_store.prekey(id)?.key_pair()?),
        None => None,
    };

    let mut secrets = Vec::with_capacity(32 * 6);
    secrets.extend_from_slice(&DISCRIMINATOR);
    secrets.extend_from_slice(
        signed_prekey
            .secret_key()
            .calculate_agreement(their_identity.public_key())?
            .as_bytes(),
    );
    secrets.extend_from_slice(
        our_identity
            .secret_key()
            .calculate_agreement(message.base_key())?
            .as_bytes(),
    );
    secrets.extend_from_slice(
        signed_prekey
            .secret_key()
            .calculate_agreement(message.base_key())?
            .as_bytes(),
    );
    if let Some(onetime_prekey) = &onetime_prekey {
        secrets.extend_from_slice(
            onetime_prekey
                .secret_key()
                .calculate_agreement(message.base_key())?
                .as_bytes(),
        );
    }
    let kyber_shared = kem_decapsulate(kyber_prekey.secret_key(), message.kyber_ciphertext())?;
    secrets.extend_from_slice(kyber_shared.as_bytes());

    let (root_key, sender_chain) = derive_root(&secrets);

    let mut state = SessionState::new(
        message.version(),
        *our_identity.identity_key(),
        their_identity,
        root_key,
        *message.base_key(),
        identity_store.local_registration_id()?,
        message.registration_id(),
    );
    // Our signed pre-key doubles as the first sending ratchet key; the initiator already
    // installed the matching receiving chain.
    state.set_sender_chain(signed_prekey, sender_chain);

    kyber_prekey_store.mark_kyber_prekey_used(
        message.kyber_prekey_id(),
        message.signed_prekey_id(),
        message.base_key(),
    )?;

    record.promote_state(state);

    debug!(
        target: "protocol::session",
        address = %remote_address,
        "responding session established from incoming handshake"
    );
    Ok(message.prekey_id())
}

fn derive_root(secrets: &[u8]) -> (RootKey, ChainKey) {
    let okm: [u8; 64] = hkdf(secrets, None, HANDSHAKE_INFO);

    let mut root = [0u8; 32];
    root.copy_from_slice(&okm[..32]);
    let mut chain = [0u8; 32];
    chain.copy_from_slice(&okm[32..]);

    (
        RootKey::new(Secret::from_bytes(root)),
        ChainKey::new(Secret::from_bytes(chain), 0),
    )
}
