// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sealed sender: envelope encryption that hides the sender's identity from the transport.
//!
//! The sender wraps a ciphertext message together with a time-bounded certificate into an
//! envelope encrypted to the recipient's identity key. The server routes the envelope without
//! learning who sent it; the recipient opens it, validates the certificate chain against a
//! trust root and only then learns and authenticates the sender. A multi-recipient variant
//! shares one encrypted body across many per-device headers.
mod certificate;
mod cipher;

pub use certificate::{
    CertificateError, CertificateValidator, SenderCertificate, ServerCertificate,
};
pub use cipher::{
    ContentHint, SealedSenderDecryptionResult, UnidentifiedSenderMessageContent,
    sealed_sender_decrypt, sealed_sender_decrypt_to_usmc, sealed_sender_encrypt,
    sealed_sender_encrypt_from_usmc, sealed_sender_multi_recipient_encrypt,
    sealed_sender_multi_recipient_message_for_single_recipient,
};
