// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-derivation chains of the double ratchet.
//!
//! A session owns one root chain and up to a handful of message chains. The root chain steps on
//! every Diffie-Hellman ratchet (new remote ratchet key observed); a message chain steps once
//! per message. All steps are one-way: advancing a chain destroys the ability to recompute
//! earlier keys.
mod chain;

pub use chain::{ChainKey, MessageKeys, RootKey};
