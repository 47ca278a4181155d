// SPDX-License-Identifier: MIT OR Apache-2.0

//! HPKE (RFC 9180) base-mode sealing to a public key.
//!
//! Sealed-sender envelopes are encrypted to the recipient's identity key with HPKE, so nothing
//! on the wire identifies the sender; authentication happens after opening, via the certificate
//! carried inside the envelope.
use hpke_rs::{Hpke, HpkePrivateKey, HpkePublicKey, Mode};
use hpke_rs_crypto::types::{AeadAlgorithm, KdfAlgorithm, KemAlgorithm};
use hpke_rs_rust_crypto::HpkeRustCrypto;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::x25519::{PublicKey, SecretKey};

/// X25519 + HKDF-SHA256 + ChaCha20-Poly1305, matching the rest of the crate's primitives.
fn hpke() -> Hpke<HpkeRustCrypto> {
    Hpke::new(
        Mode::Base,
        KemAlgorithm::DhKem25519,
        KdfAlgorithm::HkdfSha256,
        AeadAlgorithm::ChaCha20Poly1305,
    )
}

/// KEM output plus AEAD ciphertext, everything the key owner needs to open the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpkeCiphertext {
    #[serde(with = "serde_bytes")]
    kem_output: Vec<u8>,

    #[serde(with = "serde_bytes")]
    ciphertext: Vec<u8>,
}

impl HpkeCiphertext {
    pub fn len(&self) -> usize {
        self.kem_output.len() + self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kem_output.is_empty() && self.ciphertext.is_empty()
    }
}

/// Encrypts `plaintext` to the owner of `public_key`.
pub fn hpke_seal(
    public_key: &PublicKey,
    info: Option<&[u8]>,
    aad: Option<&[u8]>,
    plaintext: &[u8],
) -> Result<HpkeCiphertext, HpkeError> {
    let mut hpke = hpke();
    let public_key = HpkePublicKey::new(public_key.as_bytes().to_vec());
    let (kem_output, ciphertext) = hpke
        .seal(
            &public_key,
            info.unwrap_or_default(),
            aad.unwrap_or_default(),
            plaintext,
            None,
            None,
            None,
        )
        .map_err(|err| HpkeError::Seal(format!("{err:?}")))?;
    Ok(HpkeCiphertext {
        kem_output,
        ciphertext,
    })
}

/// Decrypts `ciphertext` with our secret key.
pub fn hpke_open(
    ciphertext: &HpkeCiphertext,
    secret_key: &SecretKey,
    info: Option<&[u8]>,
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, HpkeError> {
    let mut hpke = hpke();
    let secret_key = HpkePrivateKey::new(secret_key.as_bytes().to_vec());
    hpke.open(
        &ciphertext.kem_output,
        &secret_key,
        info.unwrap_or_default(),
        aad.unwrap_or_default(),
        &ciphertext.ciphertext,
        None,
        None,
        None,
    )
    .map_err(|_| HpkeError::Open)
}

#[derive(Debug, Error)]
pub enum HpkeError {
    #[error("hpke sealing failed: {0}")]
    Seal(String),

    #[error("hpke ciphertext failed to open")]
    Open,
}
