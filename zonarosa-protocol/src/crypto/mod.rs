// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives backing the protocol: authenticated encryption, key derivation,
//! elliptic-curve Diffie-Hellman, XEdDSA signatures, a post-quantum KEM and HPKE sealing.
//!
//! Everything in here is a thin, misuse-resistant wrapper around an audited implementation from
//! the ecosystem. No protocol logic lives in this module.
pub mod aead;
pub mod hkdf;
pub mod hpke;
pub mod kem;
mod rng;
mod secret;
pub mod sha2;
pub mod x25519;
pub mod xeddsa;

pub use rng::{Rng, RngError};
pub use secret::Secret;
