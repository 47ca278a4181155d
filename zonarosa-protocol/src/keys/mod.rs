// SPDX-License-Identifier: MIT OR Apache-2.0

//! Published key material: one-time, signed and Kyber pre-key records, and the pre-key bundle a
//! remote device assembles from them.
//!
//! Records validate their structure when deserialized but keep secret key material opaque; the
//! key pair is parsed when accessed, so a record with corrupted key bytes constructs fine and
//! fails at first use.
mod bundle;
mod kyber_prekey;
mod prekey;
mod signed_prekey;

use thiserror::Error;

pub use bundle::{PreKeyBundle, PreKeyBundleError};
pub use kyber_prekey::KyberPreKeyRecord;
pub use prekey::PreKeyRecord;
pub use signed_prekey::SignedPreKeyRecord;

/// Unique identifier of a one-time pre-key, scoped to its owning device.
pub type PreKeyId = u32;

/// Unique identifier of a signed pre-key, scoped to its owning device.
pub type SignedPreKeyId = u32;

/// Unique identifier of a Kyber pre-key, scoped to its owning device.
pub type KyberPreKeyId = u32;

#[derive(Debug, Error)]
pub enum KeyRecordError {
    /// The record deserialized fine but its key material does not form a valid key pair.
    #[error("record holds invalid key material")]
    InvalidKeyMaterial,
}
