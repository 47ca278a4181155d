// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::DeviceId;
use crate::crypto::kem::KemPublicKey;
use crate::crypto::x25519::PublicKey;
use crate::crypto::xeddsa::{XEdDSAError, XSignature};
use crate::identity::IdentityKey;
use crate::keys::{KyberPreKeyId, PreKeyId, SignedPreKeyId};

/// Snapshot of a remote device's public key material, enough to start a session without a round
/// trip to that device.
///
/// Note that while pre-keys are individually signed, bundles should travel inside an
/// authenticated transport; the bundle itself carries no outer signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    registration_id: u32,
    device_id: DeviceId,
    prekey: Option<(PreKeyId, PublicKey)>,
    signed_prekey_id: SignedPreKeyId,
    signed_prekey: PublicKey,
    signed_prekey_signature: XSignature,
    kyber_prekey_id: KyberPreKeyId,
    kyber_prekey: KemPublicKey,
    kyber_prekey_signature: XSignature,
    identity_key: IdentityKey,
}

impl PreKeyBundle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registration_id: u32,
        device_id: DeviceId,
        prekey: Option<(PreKeyId, PublicKey)>,
        signed_prekey_id: SignedPreKeyId,
        signed_prekey: PublicKey,
        signed_prekey_signature: XSignature,
        kyber_prekey_id: KyberPreKeyId,
        kyber_prekey: KemPublicKey,
        kyber_prekey_signature: XSignature,
        identity_key: IdentityKey,
    ) -> Self {
        Self {
            registration_id,
            device_id,
            prekey,
            signed_prekey_id,
            signed_prekey,
            signed_prekey_signature,
            kyber_prekey_id,
            kyber_prekey,
            kyber_prekey_signature,
            identity_key,
        }
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn prekey(&self) -> Option<&(PreKeyId, PublicKey)> {
        self.prekey.as_ref()
    }

    pub fn signed_prekey_id(&self) -> SignedPreKeyId {
        self.signed_prekey_id
    }

    pub fn signed_prekey(&self) -> &PublicKey {
        &self.signed_prekey
    }

    pub fn kyber_prekey_id(&self) -> KyberPreKeyId {
        self.kyber_prekey_id
    }

    pub fn kyber_prekey(&self) -> &KemPublicKey {
        &self.kyber_prekey
    }

    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    /// Checks both pre-key signatures against the bundle's identity key.
    ///
    /// A bundle failing this check must never be processed further; it either got corrupted in
    /// transit or someone substituted key material.
    pub fn verify_signatures(&self) -> Result<(), PreKeyBundleError> {
        self.identity_key
            .verify_signature(self.signed_prekey.as_bytes(), &self.signed_prekey_signature)?;
        self.identity_key
            .verify_signature(self.kyber_prekey.as_bytes(), &self.kyber_prekey_signature)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PreKeyBundleError {
    #[error(transparent)]
    XEdDSA(#[from] XEdDSAError),
}
