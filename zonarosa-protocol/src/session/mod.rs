// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairwise sessions: establishment via the post-quantum-augmented handshake and per-message
//! double-ratchet encryption.
//!
//! A session's life: [`process_prekey_bundle`](crate::process_prekey_bundle) (or an incoming
//! handshake message) creates it, every encrypt/decrypt mutates it, a renegotiated handshake
//! archives it, and only an explicit store delete ends it. The caller owns persistence; every
//! operation loads from and commits to the injected stores exactly once.
mod builder;
mod cipher;
mod record;
mod state;

pub use builder::process_prekey_bundle;
pub use cipher::{
    decrypt_message, decrypt_prekey_message, encrypt_message, remote_registration_id,
    session_version,
};
pub use record::SessionRecord;
pub use state::SessionState;

/// Receiver chains kept per state; older chains serve late messages after a ratchet step.
pub(crate) const MAX_RECEIVER_CHAINS: usize = 5;

/// Out-of-order message keys cached per receiver chain before the oldest is evicted.
pub(crate) const MAX_MESSAGE_KEYS: usize = 2000;

/// Hard bound on how far a message counter may jump ahead of its chain.
pub(crate) const MAX_FORWARD_JUMPS: u32 = 25_000;

/// Archived states kept per record to resolve simultaneous-initiate races.
pub(crate) const MAX_ARCHIVED_STATES: usize = 40;

/// An initiating session whose handshake was never acknowledged expires after this long.
pub(crate) const MAX_UNACKNOWLEDGED_SESSION_AGE_MS: u64 = 30 * 24 * 60 * 60 * 1000;
