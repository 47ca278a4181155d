// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-module scenario tests exercising the public protocol surface the way an application
//! would: two or more devices with their own stores, exchanging serialized messages.
mod group;
mod sealed;
mod session;
mod simultaneous;
