// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender-key group scenarios: distribution, fan-out, reordering, replay.
use uuid::Uuid;

use crate::crypto::Rng;
use crate::error::ProtocolError;
use crate::group::{
    create_sender_key_distribution_message, group_decrypt, group_encrypt,
    process_sender_key_distribution_message,
};
use crate::messages::{CiphertextMessage, SenderKeyDistributionMessage, SenderKeyMessage};
use crate::protocol_tests::support::TestDevice;

fn sender_key_message(message: &CiphertextMessage) -> SenderKeyMessage {
    SenderKeyMessage::from_bytes(message.serialized()).unwrap()
}

/// Alice distributes her chain to every member, then encrypts to the whole group at once.
#[test]
fn group_fan_out_reaches_every_member() {
    let rng = Rng::from_seed([31; 32]);
    let distribution_id = Uuid::new_v4();

    let mut alice = TestDevice::new("alice", 1, &rng);
    let mut bob = TestDevice::new("bob", 2, &rng);
    let mut carol = TestDevice::new("carol", 3, &rng);
    let alice_address = alice.address.clone();

    let distribution = create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();

    // The distribution travels out-of-band (inside pairwise-encrypted messages in practice).
    let distribution =
        SenderKeyDistributionMessage::from_bytes(distribution.serialized()).unwrap();
    for member in [&mut bob, &mut carol] {
        process_sender_key_distribution_message(
            &alice_address,
            &distribution,
            &mut member.store.sender_key_store,
        )
        .unwrap();
    }

    for round in 0..10u32 {
        let plaintext = format!("group message {round}");
        let message = group_encrypt(
            &alice_address,
            distribution_id,
            plaintext.as_bytes(),
            &mut alice.store.sender_key_store,
            &rng,
        )
        .unwrap();
        let message = sender_key_message(&message);

        for member in [&mut bob, &mut carol] {
            let decrypted = group_decrypt(
                &message,
                &alice_address,
                &mut member.store.sender_key_store,
            )
            .unwrap();
            assert_eq!(decrypted, plaintext.as_bytes());
        }
    }
}

#[test]
fn out_of_order_group_delivery() {
    let rng = Rng::from_seed([32; 32]);
    let distribution_id = Uuid::new_v4();

    let mut alice = TestDevice::new("alice", 1, &rng);
    let mut bob = TestDevice::new("bob", 2, &rng);
    let alice_address = alice.address.clone();

    let distribution = create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    process_sender_key_distribution_message(
        &alice_address,
        &distribution,
        &mut bob.store.sender_key_store,
    )
    .unwrap();

    let mut messages = Vec::new();
    for round in 0..3u8 {
        let message = group_encrypt(
            &alice_address,
            distribution_id,
            &[round],
            &mut alice.store.sender_key_store,
            &rng,
        )
        .unwrap();
        messages.push(sender_key_message(&message));
    }

    // Delivered 3, 1, 2.
    for index in [2usize, 0, 1] {
        let decrypted = group_decrypt(
            &messages[index],
            &alice_address,
            &mut bob.store.sender_key_store,
        )
        .unwrap();
        assert_eq!(decrypted, &[index as u8]);
    }
}

#[test]
fn replayed_group_message_is_rejected() {
    let rng = Rng::from_seed([33; 32]);
    let distribution_id = Uuid::new_v4();

    let mut alice = TestDevice::new("alice", 1, &rng);
    let mut bob = TestDevice::new("bob", 2, &rng);
    let alice_address = alice.address.clone();

    let distribution = create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    process_sender_key_distribution_message(
        &alice_address,
        &distribution,
        &mut bob.store.sender_key_store,
    )
    .unwrap();

    let message = group_encrypt(
        &alice_address,
        distribution_id,
        b"once",
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    let message = sender_key_message(&message);

    group_decrypt(&message, &alice_address, &mut bob.store.sender_key_store).unwrap();
    assert!(matches!(
        group_decrypt(&message, &alice_address, &mut bob.store.sender_key_store),
        Err(ProtocolError::DuplicateMessage { .. })
    ));
}

#[test]
fn message_from_unknown_sender_is_rejected() {
    let rng = Rng::from_seed([34; 32]);
    let distribution_id = Uuid::new_v4();

    let mut alice = TestDevice::new("alice", 1, &rng);
    let mut bob = TestDevice::new("bob", 2, &rng);
    let alice_address = alice.address.clone();

    create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();

    // Bob never processed Alice's distribution.
    let message = group_encrypt(
        &alice_address,
        distribution_id,
        b"who is this",
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    assert!(matches!(
        group_decrypt(
            &sender_key_message(&message),
            &alice_address,
            &mut bob.store.sender_key_store
        ),
        Err(ProtocolError::SenderKeyNotFound { .. })
    ));
}

#[test]
fn encrypting_without_a_chain_fails() {
    let rng = Rng::from_seed([35; 32]);
    let mut alice = TestDevice::new("alice", 1, &rng);
    let alice_address = alice.address.clone();

    assert!(matches!(
        group_encrypt(
            &alice_address,
            Uuid::new_v4(),
            b"no chain yet",
            &mut alice.store.sender_key_store,
            &rng,
        ),
        Err(ProtocolError::SenderKeyNotFound { .. })
    ));
}

#[test]
fn received_chains_cannot_send() {
    let rng = Rng::from_seed([36; 32]);
    let distribution_id = Uuid::new_v4();

    let mut alice = TestDevice::new("alice", 1, &rng);
    let mut bob = TestDevice::new("bob", 2, &rng);
    let alice_address = alice.address.clone();

    let distribution = create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    process_sender_key_distribution_message(
        &alice_address,
        &distribution,
        &mut bob.store.sender_key_store,
    )
    .unwrap();

    // Bob only holds the public half of the chain's signature key.
    assert!(matches!(
        group_encrypt(
            &alice_address,
            distribution_id,
            b"impersonation",
            &mut bob.store.sender_key_store,
            &rng,
        ),
        Err(ProtocolError::SenderKeyNotFound { .. })
    ));
}

#[test]
fn tampered_group_message_fails_signature_check() {
    let rng = Rng::from_seed([37; 32]);
    let distribution_id = Uuid::new_v4();

    let mut alice = TestDevice::new("alice", 1, &rng);
    let mut bob = TestDevice::new("bob", 2, &rng);
    let alice_address = alice.address.clone();

    let distribution = create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    process_sender_key_distribution_message(
        &alice_address,
        &distribution,
        &mut bob.store.sender_key_store,
    )
    .unwrap();

    let message = group_encrypt(
        &alice_address,
        distribution_id,
        b"authentic",
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();

    // Flip a bit in the signature.
    let mut tampered = message.serialized().to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 1;
    let tampered = SenderKeyMessage::from_bytes(&tampered).unwrap();

    assert!(
        group_decrypt(&tampered, &alice_address, &mut bob.store.sender_key_store).is_err()
    );
}

#[test]
fn late_joiner_cannot_read_earlier_messages() {
    let rng = Rng::from_seed([38; 32]);
    let distribution_id = Uuid::new_v4();

    let mut alice = TestDevice::new("alice", 1, &rng);
    let mut dave = TestDevice::new("dave", 4, &rng);
    let alice_address = alice.address.clone();

    create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();

    // Two messages go out before Dave joins.
    let early = group_encrypt(
        &alice_address,
        distribution_id,
        b"before dave",
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    group_encrypt(
        &alice_address,
        distribution_id,
        b"also before dave",
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();

    // Dave receives the distribution at the current iteration.
    let distribution = create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    assert_eq!(distribution.iteration(), 2);
    process_sender_key_distribution_message(
        &alice_address,
        &distribution,
        &mut dave.store.sender_key_store,
    )
    .unwrap();

    // Earlier traffic stays out of reach, later traffic decrypts.
    assert!(
        group_decrypt(
            &sender_key_message(&early),
            &alice_address,
            &mut dave.store.sender_key_store
        )
        .is_err()
    );

    let current = group_encrypt(
        &alice_address,
        distribution_id,
        b"after dave",
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    assert_eq!(
        group_decrypt(
            &sender_key_message(&current),
            &alice_address,
            &mut dave.store.sender_key_store
        )
        .unwrap(),
        b"after dave"
    );
}
