// SPDX-License-Identifier: MIT OR Apache-2.0

//! HKDF-SHA256 key derivation.
use hkdf::Hkdf;
use sha2::Sha256;

/// Derives `N` bytes of output key material from `ikm` via HKDF-SHA256.
///
/// `salt` is optional per RFC 5869; the protocol passes the current root key as salt when
/// stepping the root chain and no salt during the initial handshake derivation. `info` is a
/// domain-separation label, never secret.
pub fn hkdf<const N: usize>(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> [u8; N] {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut out = [0u8; N];
    hk.expand(info, &mut out)
        .expect("hkdf output length within bounds");
    out
}
