// SPDX-License-Identifier: MIT OR Apache-2.0

//! Simultaneous-initiate scenarios: both peers build sessions to each other before either
//! first message arrives, and the record's archived states converge them back to one session.
use crate::crypto::Rng;
use crate::messages::MessageType;
use crate::protocol_tests::support::{TestDevice, current_base_key, decrypt_from, encrypt_to};
use crate::session::process_prekey_bundle;

fn initiate_both_ways(rng: &Rng) -> (TestDevice, TestDevice) {
    let mut alice = TestDevice::new("+14159998888", 11, rng);
    let mut bob = TestDevice::new("+14151231234", 22, rng);

    let alice_bundle = alice.create_bundle(rng);
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
    process_prekey_bundle(
        &alice.address.clone(),
        &alice_bundle,
        &mut bob.store.session_store,
        &mut bob.store.identity_store,
        0,
        rng,
    )
    .unwrap();

    (alice, bob)
}

#[test]
fn basic_simultaneous_initiate_converges() {
    let rng = Rng::from_seed([21; 32]);
    let (mut alice, mut bob) = initiate_both_ways(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    let message_for_bob = encrypt_to(&mut alice, &bob_address, b"hey there", 0);
    let message_for_alice = encrypt_to(&mut bob, &alice_address, b"sample message", 0);

    assert_eq!(message_for_bob.message_type(), MessageType::PreKey);
    assert_eq!(message_for_alice.message_type(), MessageType::PreKey);

    // Two independent handshakes are in flight.
    assert_ne!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );

    let alice_plaintext = decrypt_from(&mut alice, &bob_address, &message_for_alice, &rng).unwrap();
    let bob_plaintext = decrypt_from(&mut bob, &alice_address, &message_for_bob, &rng).unwrap();
    assert_eq!(alice_plaintext, b"sample message");
    assert_eq!(bob_plaintext, b"hey there");

    // Each side now sits on the session the *other* side initiated; still two sessions.
    assert_ne!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );

    // One ordinary round trip settles both on the same session.
    let response = encrypt_to(&mut alice, &bob_address, b"second message", 0);
    assert_eq!(response.message_type(), MessageType::Ratchet);
    assert_eq!(
        decrypt_from(&mut bob, &alice_address, &response, &rng).unwrap(),
        b"second message"
    );
    assert_eq!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );

    let final_message = encrypt_to(&mut bob, &alice_address, b"third message", 0);
    assert_eq!(final_message.message_type(), MessageType::Ratchet);
    assert_eq!(
        decrypt_from(&mut alice, &bob_address, &final_message, &rng).unwrap(),
        b"third message"
    );
    assert_eq!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );
}

#[test]
fn lost_simultaneous_initiate_converges() {
    let rng = Rng::from_seed([22; 32]);
    let (mut alice, mut bob) = initiate_both_ways(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    let message_for_bob = encrypt_to(&mut alice, &bob_address, b"hey there", 0);
    // Bob's initiate is lost in transit.
    let _lost = encrypt_to(&mut bob, &alice_address, b"sample message", 0);

    assert_eq!(
        decrypt_from(&mut bob, &alice_address, &message_for_bob, &rng).unwrap(),
        b"hey there"
    );

    // Alice never saw Bob's handshake, so she keeps carrying her own.
    let response = encrypt_to(&mut alice, &bob_address, b"second message", 0);
    assert_eq!(response.message_type(), MessageType::PreKey);
    assert_eq!(
        decrypt_from(&mut bob, &alice_address, &response, &rng).unwrap(),
        b"second message"
    );
    assert_eq!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );

    let final_message = encrypt_to(&mut bob, &alice_address, b"third message", 0);
    assert_eq!(final_message.message_type(), MessageType::Ratchet);
    assert_eq!(
        decrypt_from(&mut alice, &bob_address, &final_message, &rng).unwrap(),
        b"third message"
    );
    assert_eq!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );
}

#[test]
fn repeated_simultaneous_initiates_converge_and_stay_converged() {
    let rng = Rng::from_seed([23; 32]);
    let (mut alice, mut bob) = initiate_both_ways(&rng);
    let alice_address = alice.address.clone();
    let bob_address = bob.address.clone();

    // Several racing rounds where both sides fire before either receives.
    for round in 0..15u32 {
        let for_bob = encrypt_to(&mut alice, &bob_address, format!("alice {round}").as_bytes(), 0);
        let for_alice = encrypt_to(&mut bob, &alice_address, format!("bob {round}").as_bytes(), 0);

        assert_eq!(
            decrypt_from(&mut alice, &bob_address, &for_alice, &rng).unwrap(),
            format!("bob {round}").as_bytes()
        );
        assert_eq!(
            decrypt_from(&mut bob, &alice_address, &for_bob, &rng).unwrap(),
            format!("alice {round}").as_bytes()
        );
    }

    // One non-racing round trip is enough to converge.
    let settle = encrypt_to(&mut alice, &bob_address, b"settle", 0);
    decrypt_from(&mut bob, &alice_address, &settle, &rng).unwrap();
    let settle_back = encrypt_to(&mut bob, &alice_address, b"settle back", 0);
    decrypt_from(&mut alice, &bob_address, &settle_back, &rng).unwrap();

    assert_eq!(
        current_base_key(&alice, &bob_address),
        current_base_key(&bob, &alice_address)
    );

    // Converged for good: 50 more alternating messages, no divergence.
    for round in 0..50u32 {
        let to_bob = format!("after {round}");
        let message = encrypt_to(&mut alice, &bob_address, to_bob.as_bytes(), 0);
        assert_eq!(message.message_type(), MessageType::Ratchet);
        assert_eq!(
            decrypt_from(&mut bob, &alice_address, &message, &rng).unwrap(),
            to_bob.as_bytes()
        );

        let to_alice = format!("back {round}");
        let message = encrypt_to(&mut bob, &alice_address, to_alice.as_bytes(), 0);
        assert_eq!(message.message_type(), MessageType::Ratchet);
        assert_eq!(
            decrypt_from(&mut alice, &bob_address, &message, &rng).unwrap(),
            to_alice.as_bytes()
        );

        assert_eq!(
            current_base_key(&alice, &bob_address),
            current_base_key(&bob, &alice_address)
        );
    }
}
