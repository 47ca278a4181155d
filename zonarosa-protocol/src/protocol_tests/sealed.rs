// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed-sender scenarios: single and multi-recipient envelopes, certificate validation,
//! self-send detection.
use uuid::Uuid;

use crate::address::{DeviceId, ServiceId};
use crate::crypto::Rng;
use crate::crypto::x25519::KeyPair;
use crate::error::ProtocolError;
use crate::group::{
    create_sender_key_distribution_message, group_encrypt,
    process_sender_key_distribution_message,
};
use crate::messages::MessageType;
use crate::protocol_tests::support::TestDevice;
use crate::sealed::{
    CertificateValidator, ContentHint, SenderCertificate, ServerCertificate,
    UnidentifiedSenderMessageContent, sealed_sender_decrypt, sealed_sender_encrypt,
    sealed_sender_multi_recipient_encrypt,
    sealed_sender_multi_recipient_message_for_single_recipient,
};
use crate::session::process_prekey_bundle;
use crate::traits::{IdentityKeyStore, SessionStore};

struct TrustChain {
    trust_root: KeyPair,
    server_key: KeyPair,
    server_certificate: ServerCertificate,
}

impl TrustChain {
    fn new(rng: &Rng) -> Self {
        let trust_root = KeyPair::generate(rng).unwrap();
        let server_key = KeyPair::generate(rng).unwrap();
        let server_certificate =
            ServerCertificate::new(1, *server_key.public_key(), trust_root.secret_key(), rng)
                .unwrap();
        Self {
            trust_root,
            server_key,
            server_certificate,
        }
    }

    fn validator(&self) -> CertificateValidator {
        CertificateValidator::new(vec![*self.trust_root.public_key()])
    }

    fn certify(
        &self,
        device: &TestDevice,
        uuid: Uuid,
        e164: Option<&str>,
        expiration_ms: u64,
        rng: &Rng,
    ) -> SenderCertificate {
        let identity = device.store.identity_store.identity_key_pair().unwrap();
        SenderCertificate::new(
            uuid.to_string(),
            e164.map(str::to_string),
            device.address.device_id(),
            *identity.identity_key(),
            expiration_ms,
            self.server_certificate.clone(),
            self.server_key.secret_key(),
            rng,
        )
        .unwrap()
    }
}

/// Alice establishes a session to Bob and sends one sealed message.
fn sealed_pair(rng: &Rng) -> (Uuid, TestDevice, Uuid, TestDevice, TrustChain) {
    let (alice_uuid, mut alice) = TestDevice::with_uuid_name(11, rng);
    let (bob_uuid, mut bob) = TestDevice::with_uuid_name(22, rng);

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

    let chain = TrustChain::new(rng);
    (alice_uuid, alice, bob_uuid, bob, chain)
}

#[allow(clippy::too_many_arguments)]
fn decrypt_on(
    device: &mut TestDevice,
    local_uuid: Uuid,
    validator: &CertificateValidator,
    envelope: &[u8],
    timestamp_ms: u64,
    rng: &Rng,
) -> Result<crate::sealed::SealedSenderDecryptionResult, ProtocolError> {
    let device_id = device.address.device_id();
    sealed_sender_decrypt(
        envelope,
        validator,
        timestamp_ms,
        None,
        &local_uuid.to_string(),
        device_id,
        &mut device.store.session_store,
        &mut device.store.identity_store,
        &mut device.store.prekey_store,
        &mut device.store.signed_prekey_store,
        &mut device.store.kyber_prekey_store,
        &mut device.store.sender_key_store,
        rng,
    )
}

#[test]
fn sealed_round_trip_authenticates_the_sender() {
    let rng = Rng::from_seed([41; 32]);
    let (alice_uuid, mut alice, bob_uuid, mut bob, chain) = sealed_pair(&rng);
    let bob_address = bob.address.clone();

    let certificate = chain.certify(&alice, alice_uuid, Some("+14159998888"), 10_000, &rng);
    let envelope = sealed_sender_encrypt(
        &bob_address,
        certificate,
        b"hidden hello",
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
    )
    .unwrap();

    let result = decrypt_on(&mut bob, bob_uuid, &chain.validator(), &envelope, 100, &rng).unwrap();

    assert_eq!(result.message, b"hidden hello");
    assert_eq!(result.sender_uuid, alice_uuid.to_string());
    assert_eq!(result.sender_e164.as_deref(), Some("+14159998888"));
    assert_eq!(result.device_id, alice.address.device_id());
    assert_eq!(result.message_type, MessageType::PreKey);
}

#[test]
fn expired_certificate_is_rejected() {
    let rng = Rng::from_seed([42; 32]);
    let (alice_uuid, mut alice, bob_uuid, mut bob, chain) = sealed_pair(&rng);
    let bob_address = bob.address.clone();

    let certificate = chain.certify(&alice, alice_uuid, None, 10_000, &rng);
    let envelope = sealed_sender_encrypt(
        &bob_address,
        certificate,
        b"stale",
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
    )
    .unwrap();

    // Valid at the expiration instant, rejected after.
    assert!(matches!(
        decrypt_on(&mut bob, bob_uuid, &chain.validator(), &envelope, 20_000, &rng),
        Err(ProtocolError::Certificate(_))
    ));
}

#[test]
fn certificate_from_unknown_trust_root_is_rejected() {
    let rng = Rng::from_seed([43; 32]);
    let (alice_uuid, mut alice, bob_uuid, mut bob, chain) = sealed_pair(&rng);
    let bob_address = bob.address.clone();

    let certificate = chain.certify(&alice, alice_uuid, None, 10_000, &rng);
    let envelope = sealed_sender_encrypt(
        &bob_address,
        certificate,
        b"who signed this",
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
    )
    .unwrap();

    let unrelated = TrustChain::new(&rng);
    assert!(matches!(
        decrypt_on(&mut bob, bob_uuid, &unrelated.validator(), &envelope, 100, &rng),
        Err(ProtocolError::Certificate(_))
    ));
}

#[test]
fn self_addressed_envelope_is_flagged() {
    let rng = Rng::from_seed([44; 32]);
    let (_, mut alice, bob_uuid, mut bob, chain) = sealed_pair(&rng);
    let bob_address = bob.address.clone();

    // The certificate claims the envelope comes from Bob's own address.
    let certificate = chain.certify(&bob, bob_uuid, None, 10_000, &rng);
    let envelope = sealed_sender_encrypt(
        &bob_address,
        certificate,
        b"looped back",
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
    )
    .unwrap();

    assert!(matches!(
        decrypt_on(&mut bob, bob_uuid, &chain.validator(), &envelope, 100, &rng),
        Err(ProtocolError::SelfSend)
    ));
}

#[test]
fn multi_recipient_envelope_shares_one_body() {
    let rng = Rng::from_seed([45; 32]);
    let (alice_uuid, mut alice) = TestDevice::with_uuid_name(11, &rng);
    let (bob_uuid, mut bob) = TestDevice::with_uuid_name(22, &rng);
    let (carol_uuid, mut carol) = TestDevice::with_uuid_name(33, &rng);
    let alice_address = alice.address.clone();
    let chain = TrustChain::new(&rng);

    // Pairwise sessions to every destination device.
    for member in [&mut bob, &mut carol] {
        let bundle = member.create_bundle(&rng);
        process_prekey_bundle(
            &member.address.clone(),
            &bundle,
            &mut alice.store.session_store,
            &mut alice.store.identity_store,
            0,
            &rng,
        )
        .unwrap();
    }

    // The group chain travels out-of-band here; in production inside pairwise messages.
    let distribution_id = Uuid::new_v4();
    let distribution = create_sender_key_distribution_message(
        &alice_address,
        distribution_id,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();
    for member in [&mut bob, &mut carol] {
        process_sender_key_distribution_message(
            &alice_address,
            &distribution,
            &mut member.store.sender_key_store,
        )
        .unwrap();
    }

    let plaintext = vec![0x5A; 8 * 1024];
    let message = group_encrypt(
        &alice_address,
        distribution_id,
        &plaintext,
        &mut alice.store.sender_key_store,
        &rng,
    )
    .unwrap();

    let certificate = chain.certify(&alice, alice_uuid, None, 10_000, &rng);
    let content = UnidentifiedSenderMessageContent::new(
        &message,
        certificate,
        ContentHint::Resendable,
        Some(b"group id".to_vec()),
    );

    let bob_address = bob.address.clone();
    let carol_address = carol.address.clone();
    let destinations = [&bob_address, &carol_address];
    let sessions = alice
        .store
        .session_store
        .load_existing_sessions(&destinations)
        .unwrap();
    let session_refs: Vec<&crate::session::SessionRecord> = sessions.iter().collect();

    let excluded = [ServiceId::Aci(Uuid::new_v4())];
    let envelope = sealed_sender_multi_recipient_encrypt(
        &destinations,
        &session_refs,
        &excluded,
        &content,
        &rng,
    )
    .unwrap();

    // The shared body dominates; the second recipient only costs a small header, not a
    // second copy of the 8 KiB payload.
    let single_envelope = sealed_sender_multi_recipient_encrypt(
        &destinations[..1],
        &session_refs[..1],
        &[],
        &content,
        &rng,
    )
    .unwrap();
    assert!(envelope.len() - single_envelope.len() < 1024);

    // Every included recipient independently recovers the identical plaintext.
    for (member, uuid) in [(&mut bob, bob_uuid), (&mut carol, carol_uuid)] {
        let received = sealed_sender_multi_recipient_message_for_single_recipient(
            &envelope,
            &ServiceId::Aci(uuid),
            DeviceId::new(1).unwrap(),
        )
        .unwrap();
        let result = decrypt_on(member, uuid, &chain.validator(), &received, 100, &rng).unwrap();
        assert_eq!(result.message, plaintext);
        assert_eq!(result.message_type, MessageType::SenderKey);
        assert_eq!(result.group_id.as_deref(), Some(b"group id".as_slice()));
    }

    // Excluded recipients are listed without any key material to extract.
    assert!(matches!(
        sealed_sender_multi_recipient_message_for_single_recipient(
            &envelope,
            &excluded[0],
            DeviceId::new(1).unwrap(),
        ),
        Err(ProtocolError::InvalidArgument(_))
    ));
}

#[test]
fn multi_recipient_contract_violations() {
    let rng = Rng::from_seed([46; 32]);
    let (alice_uuid, mut alice) = TestDevice::with_uuid_name(11, &rng);
    let (_, mut bob) = TestDevice::with_uuid_name(0x4001, &rng);
    let chain = TrustChain::new(&rng);

    let bundle = bob.create_bundle(&rng);
    process_prekey_bundle(
        &bob.address.clone(),
        &bundle,
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
        &rng,
    )
    .unwrap();

    let bob_address = bob.address.clone();
    let message = crate::session::encrypt_message(
        b"payload",
        &bob_address,
        &mut alice.store.session_store,
        &mut alice.store.identity_store,
        0,
    )
    .unwrap();
    let certificate = chain.certify(&alice, alice_uuid, None, 10_000, &rng);
    let content =
        UnidentifiedSenderMessageContent::new(&message, certificate, ContentHint::Default, None);

    let destinations = [&bob_address];
    let sessions = alice
        .store
        .session_store
        .load_existing_sessions(&destinations)
        .unwrap();
    let session_refs: Vec<&crate::session::SessionRecord> = sessions.iter().collect();

    // Destination/session count mismatch is a caller bug.
    assert!(matches!(
        sealed_sender_multi_recipient_encrypt(&destinations, &[], &[], &content, &rng),
        Err(ProtocolError::InvalidArgument(_))
    ));

    // Bob's registration id does not fit the 14-bit header encoding.
    assert!(matches!(
        sealed_sender_multi_recipient_encrypt(
            &destinations,
            &session_refs,
            &[],
            &content,
            &rng
        ),
        Err(ProtocolError::InvalidRegistrationId { id: 0x4001, .. })
    ));
}
