// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairwise session scenarios: establishment, round trips, reordering, duplicates.
use crate::crypto::Rng;
use crate::error::ProtocolError;
use crate::messages::MessageType;
use crate::protocol_tests::support::{TestDevice, current_base_key, decrypt_from, encrypt_to};
use crate::session::process_prekey_bundle;

fn established_pair(rng: &Rng) -> (TestDevice, TestDevice) {
    let mut alice = TestDevice::new("+14159998888", 11, rng);
    let mut bob = TestDevice::new("+14151231234", 22, rng);

    let bob_bundle = bob.create_bundle(rng);
    process_prekey_bundle(
        &bob.address.clone(),
        &bob_bundle,
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
        rng,
    )
    .unwrap();

    (alice, bob)
}

#[test]
fn round_trip_for_all_small_plaintext_lengths() {
    let rng = Rng::from_seed([1; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    for length in 0..=64usize {
        let plaintext = vec![0xAB; length];

        // Alice to Bob; the very first messages carry the handshake.
        let message = encrypt_to(&mut alice, &bob_address, &plaintext, 0);
        let decrypted = decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap();
        assert_eq!(decrypted, plaintext);

        // And back, exercising the other direction of the ratchet.
        let reply = encrypt_to(&mut bob, &alice_address, &plaintext, 0);
        let decrypted = decrypt_from(&mut alice, &bob_address, &reply, &rng).unwrap();
        assert_eq!(decrypted, plaintext);
    }
}

#[test]
fn handshake_is_carried_until_acknowledged() {
    let rng = Rng::from_seed([2; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    // Everything Alice sends before hearing back carries the handshake.
    let first = encrypt_to(&mut alice, &bob_address, b"first", 0);
    let second = encrypt_to(&mut alice, &bob_address, b"second", 0);
    assert_eq!(first.message_type(), MessageType::PreKey);
    assert_eq!(second.message_type(), MessageType::PreKey);

    decrypt_from(&mut bob, &alice_address, &first, &rng).unwrap();
    decrypt_from(&mut bob, &alice_address, &second, &rng).unwrap();

    // Bob never had a pending handshake; his replies are plain ratchet messages.
    let reply = encrypt_to(&mut bob, &alice_address, b"reply", 0);
    assert_eq!(reply.message_type(), MessageType::Ratchet);
    decrypt_from(&mut alice, &bob_address, &reply, &rng).unwrap();

    // Hearing back acknowledged the session on Alice's side.
    let third = encrypt_to(&mut alice, &bob_address, b"third", 0);
    assert_eq!(third.message_type(), MessageType::Ratchet);
    decrypt_from(&mut bob, &alice_address, &third, &rng).unwrap();

    assert_eq!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );
}

#[test]
fn duplicate_delivery_is_rejected() {
    let rng = Rng::from_seed([3; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    let message = encrypt_to(&mut alice, &bob_address, b"once only", 0);
    decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap();

    assert!(matches!(
        decrypt_from(&mut bob, &alice_address, &message, &rng),
        Err(ProtocolError::DuplicateMessage { .. })
    ));

    // Also after more traffic went through.
    let later = encrypt_to(&mut alice, &bob_address, b"later", 0);
    decrypt_from(&mut bob, &alice_address, &later, &rng).unwrap();
    assert!(matches!(
        decrypt_from(&mut bob, &alice_address, &message, &rng),
        Err(ProtocolError::DuplicateMessage { .. })
    ));
}

#[test]
fn out_of_order_delivery_within_one_chain() {
    let rng = Rng::from_seed([4; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    let message_1 = encrypt_to(&mut alice, &bob_address, b"message one", 0);
    let message_2 = encrypt_to(&mut alice, &bob_address, b"message two", 0);
    let message_3 = encrypt_to(&mut alice, &bob_address, b"message three", 0);

    // Delivered 3, 1, 2.
    assert_eq!(
        decrypt_from(&mut bob, &alice_address, &message_3, &rng).unwrap(),
        b"message three"
    );
    assert_eq!(
        decrypt_from(&mut bob, &alice_address, &message_1, &rng).unwrap(),
        b"message one"
    );
    assert_eq!(
        decrypt_from(&mut bob, &alice_address, &message_2, &rng).unwrap(),
        b"message two"
    );
}

#[test]
fn late_message_from_an_older_chain_still_decrypts() {
    let rng = Rng::from_seed([5; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    // A message is encrypted but held back across a full ratchet turn.
    let held_back = encrypt_to(&mut alice, &bob_address, b"held back", 0);
    let delivered = encrypt_to(&mut alice, &bob_address, b"delivered", 0);

    decrypt_from(&mut bob, &alice_address, &delivered, &rng).unwrap();
    let reply = encrypt_to(&mut bob, &alice_address, b"reply", 0);
    decrypt_from(&mut alice, &bob_address, &reply, &rng).unwrap();
    let fresh = encrypt_to(&mut alice, &bob_address, b"fresh chain", 0);
    decrypt_from(&mut bob, &alice_address, &fresh, &rng).unwrap();

    // The held-back message arrives after Bob ratcheted to a newer receiving chain.
    assert_eq!(
        decrypt_from(&mut bob, &alice_address, &held_back, &rng).unwrap(),
        b"held back"
    );
}

#[test]
fn an_undelivered_message_does_not_block_later_traffic() {
    let rng = Rng::from_seed([6; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    // Message 0 is lost forever; everything after it keeps flowing.
    let _lost = encrypt_to(&mut alice, &bob_address, b"lost", 0);
    for round in 0..20u8 {
        let message = encrypt_to(&mut alice, &bob_address, &[round], 0);
        assert_eq!(
            decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap(),
            &[round]
        );
    }
}

#[test]
fn long_interaction_in_both_directions() {
    let rng = Rng::from_seed([7; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    for round in 0..50u32 {
        let to_bob = format!("alice {round}");
        let message = encrypt_to(&mut alice, &bob_address, to_bob.as_bytes(), 0);
        assert_eq!(
            decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap(),
            to_bob.as_bytes()
        );

        let to_alice = format!("bob {round}");
        let message = encrypt_to(&mut bob, &alice_address, to_alice.as_bytes(), 0);
        assert_eq!(
            decrypt_from(&mut alice, &bob_address, &message, &rng).unwrap(),
            to_alice.as_bytes()
        );
    }
}

#[test]
fn encrypting_without_a_session_fails() {
    let rng = Rng::from_seed([8; 32]);
    let mut alice = TestDevice::new("+14159998888", 11, &rng);
    let bob = TestDevice::new("+14151231234", 22, &rng);

    let result = crate::session::encrypt_message(
        b"hello?",
        &bob.address,
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
    );
    assert!(matches!(
        result,
        Err(ProtocolError::SessionNotFound { .. })
    ));
}

#[test]
fn stale_unacknowledged_session_expires() {
    let rng = Rng::from_seed([9; 32]);
    let (mut alice, bob) = established_pair(&rng);
    let bob_address = bob.address.clone();

    // 29 days in, the handshake may still be retransmitted.
    let twenty_nine_days = 29 * 24 * 60 * 60 * 1000;
    let message = encrypt_to(&mut alice, &bob_address, b"still fine", twenty_nine_days);
    assert_eq!(message.message_type(), MessageType::PreKey);

    // After 31 days without an acknowledgement the session is unusable; the caller has to
    // fetch a fresh bundle.
    let thirty_one_days = 31 * 24 * 60 * 60 * 1000;
    let result = crate::session::encrypt_message(
        b"too late",
        &bob_address,
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        thirty_one_days,
    );
    assert!(matches!(
        result,
        Err(ProtocolError::SessionNotFound { .. })
    ));
}

#[test]
fn changed_identity_blocks_encryption_until_accepted() {
    let rng = Rng::from_seed([10; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    let message = encrypt_to(&mut alice, &bob_address, b"hello", 0);
    decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap();

    // Bob reinstalls: fresh identity under the same address.
    let mut new_bob = TestDevice::new("+14151231234", 33, &rng);
    let new_bundle = new_bob.create_bundle(&rng);

    // Alice's store still pins the old identity; building a session to the new one is
    // blocked pending an explicit decision.
    let result = process_prekey_bundle(
        &bob_address,
        &new_bundle,
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
        &rng,
    );
    assert!(matches!(
        result,
        Err(ProtocolError::UntrustedIdentity { .. })
    ));

    // The explicit decision: save the new identity, then the bundle processes.
    use crate::traits::IdentityKeyStore;
    alice
        .store
        .identity_store
        .save_identity(&bob_address, new_bundle.identity_key())
        .unwrap();
    process_prekey_bundle(
        &bob_address,
        &new_bundle,
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
        &rng,
    )
    .unwrap();

    let message = encrypt_to(&mut alice, &bob_address, b"hello again", 0);
    let decrypted = decrypt_from(&mut new_bob, &alice_address, &message, &rng).unwrap();
    assert_eq!(decrypted, b"hello again");
}

#[test]
fn one_time_prekey_is_consumed_on_first_use() {
    let rng = Rng::from_seed([11; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    let message = encrypt_to(&mut alice, &bob_address, b"hello", 0);
    decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap();

    use crate::traits::PreKeyStore;
    assert!(bob.store.prekey_store.all_prekeys().unwrap().is_empty());

    // A retransmission of the handshake message is a duplicate, not a second consumption.
    assert!(matches!(
        decrypt_from(&mut bob, &alice_address, &message, &rng),
        Err(ProtocolError::DuplicateMessage { .. })
    ));
}

#[test]
fn registration_ids_and_version_are_exchanged() {
    let rng = Rng::from_seed([12; 32]);
    let (mut alice, mut bob) = established_pair(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    let message = encrypt_to(&mut alice, &bob_address, b"hello", 0);
    decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap();

    assert_eq!(
        crate::session::remote_registration_id(&bob_address, &alice.store.session_store).unwrap(),
        22
    );
    assert_eq!(
        crate::session::remote_registration_id(&alice_address, &bob.store.session_store).unwrap(),
        11
    );
    assert_eq!(
        crate::session::session_version(&bob_address, &alice.store.session_store).unwrap(),
        4
    );
}
