// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-to-many group fan-out via sender keys.
//!
//! Instead of a pairwise session per member, every sender keeps one ratcheting chain per
//! group (identified by a distribution id) and distributes it out-of-band once. Group
//! messages are encrypted from that chain and signed with a per-chain signature key, so any
//! member authenticates the origin without holding a session with the sender.
mod cipher;
mod record;

pub use cipher::{
    create_sender_key_distribution_message, group_decrypt, group_encrypt,
    process_sender_key_distribution_message,
};
pub use record::SenderKeyRecord;
pub(crate) use record::SenderKeyState;

/// Chain generations kept per (sender, distribution id); re-keying starts a new generation.
pub(crate) const MAX_SENDER_KEY_STATES: usize = 5;

/// Out-of-order message keys cached per chain before the oldest is evicted.
pub(crate) const MAX_SENDER_MESSAGE_KEYS: usize = 2000;

/// Hard bound on how far a group message's iteration may jump ahead of its chain.
pub(crate) const MAX_SENDER_FORWARD_JUMPS: u32 = 25_000;
