// SPDX-License-Identifier: MIT OR Apache-2.0

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::Secret;
use crate::crypto::aead::{AEAD_KEY_SIZE, AEAD_NONCE_SIZE};
use crate::crypto::hkdf::hkdf;
use crate::crypto::x25519::{PublicKey, SecretKey, X25519Error};

type HmacSha256 = Hmac<Sha256>;

/// Label for deriving a message key seed from a chain key.
const MESSAGE_KEY_SEED: &[u8] = &[0x01];

/// Label for deriving the next chain key.
const CHAIN_KEY_SEED: &[u8] = &[0x02];

/// Domain separation for stepping the root chain.
const ROOT_CHAIN_INFO: &[u8] = b"ZonaRosaRootChain";

/// Domain separation for expanding a message key seed into key and nonce.
const MESSAGE_KEYS_INFO: &[u8] = b"ZonaRosaMessageKeys";

/// Root key of a session.
///
/// Every observed remote ratchet key steps the root chain once, mixing a fresh Diffie-Hellman
/// output into the session. This is what gives the protocol post-compromise recovery: an
/// attacker holding old state loses track after one honest round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKey(Secret<32>);

impl RootKey {
    pub(crate) fn new(secret: Secret<32>) -> Self {
        Self(secret)
    }

    /// Steps the root chain with a Diffie-Hellman output and derives the first chain key of a
    /// new message chain.
    pub(crate) fn create_chain(
        &self,
        their_ratchet_key: &PublicKey,
        our_ratchet_key: &SecretKey,
    ) -> Result<(RootKey, ChainKey), X25519Error> {
        let shared_secret = our_ratchet_key.calculate_agreement(their_ratchet_key)?;
        let okm: [u8; 64] = hkdf(
            shared_secret.as_bytes(),
            Some(self.0.as_bytes()),
            ROOT_CHAIN_INFO,
        );

        let mut root = [0u8; 32];
        root.copy_from_slice(&okm[..32]);
        let mut chain = [0u8; 32];
        chain.copy_from_slice(&okm[32..]);

        Ok((
            RootKey(Secret::from_bytes(root)),
            ChainKey::new(Secret::from_bytes(chain), 0),
        ))
    }
}

/// One link of a message chain.
///
/// The index counts how many message keys were derived from this chain so far and doubles as
/// the message counter on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainKey {
    key: Secret<32>,
    index: u32,
}

impl ChainKey {
    pub(crate) fn new(key: Secret<32>, index: u32) -> Self {
        Self { key, index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn key(&self) -> &Secret<32> {
        &self.key
    }

    /// Derives the next link, destroying the ability to recompute this one's message key.
    pub(crate) fn next(&self) -> ChainKey {
        ChainKey {
            key: Secret::from_bytes(hmac_sha256(self.key.as_bytes(), CHAIN_KEY_SEED)),
            index: self.index.wrapping_add(1),
        }
    }

    /// Derives the message key material for this link's counter.
    pub(crate) fn message_keys(&self) -> MessageKeys {
        let seed = hmac_sha256(self.key.as_bytes(), MESSAGE_KEY_SEED);
        MessageKeys::derive(&seed, self.index)
    }
}

/// Key material for exactly one message: AEAD key, nonce and the counter it belongs to.
///
/// The nonce is derived together with the key, so a key is never combined with two different
/// nonces. Consumed on use; only out-of-order delivery keeps one cached for a while.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeys {
    key: Secret<AEAD_KEY_SIZE>,
    nonce: Secret<AEAD_NONCE_SIZE>,
    counter: u32,
}

impl MessageKeys {
    pub(crate) fn derive(seed: &[u8; 32], counter: u32) -> Self {
        let okm: [u8; AEAD_KEY_SIZE + AEAD_NONCE_SIZE] = hkdf(seed, None, MESSAGE_KEYS_INFO);

        let mut key = [0u8; AEAD_KEY_SIZE];
        key.copy_from_slice(&okm[..AEAD_KEY_SIZE]);
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        nonce.copy_from_slice(&okm[AEAD_KEY_SIZE..]);

        Self {
            key: Secret::from_bytes(key),
            nonce: Secret::from_bytes(nonce),
            counter,
        }
    }

    pub(crate) fn key(&self) -> &[u8; AEAD_KEY_SIZE] {
        self.key.as_bytes()
    }

    pub(crate) fn nonce(&self) -> &[u8; AEAD_NONCE_SIZE] {
        self.nonce.as_bytes()
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

fn hmac_sha256(key: &[u8], label: &[u8]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("hmac-sha256 accepts any key size");
    };
    mac.update(label);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}
