// SPDX-License-Identifier: MIT OR Apache-2.0

//! Addressing of remote devices.
//!
//! A logical user owns up to 127 devices; each device is reachable under a [`ProtocolAddress`]
//! of the user's name and the device id. Sessions, identities and sender-key chains are all
//! keyed by the full address, never by the name alone.
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Highest valid device id.
pub const MAX_DEVICE_ID: u32 = 127;

/// Fixed width of a [`ServiceId`] in binary form: one kind byte plus the raw UUID.
pub const SERVICE_ID_BINARY_SIZE: usize = 17;

/// Identifier of one device of a user, in the range `1..=127`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(u8);

impl DeviceId {
    pub fn new(value: u32) -> Result<Self, AddressError> {
        if value == 0 || value > MAX_DEVICE_ID {
            return Err(AddressError::InvalidDeviceId { value });
        }
        Ok(Self(value as u8))
    }

    pub fn value(self) -> u32 {
        u32::from(self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of one remote device: the user's identifier plus a device id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolAddress {
    name: String,
    device_id: DeviceId,
}

impl ProtocolAddress {
    pub fn new(name: impl Into<String>, device_id: DeviceId) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    /// An identifier for the logical user: a service id string, UUID or other account handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

/// Account identifier on the service: either the primary identity (ACI) or the
/// phone-number-derived identity (PNI).
///
/// The fixed-width binary form is what multi-recipient envelopes carry per recipient, so the
/// server can route and enforce group membership without parsing strings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceId {
    Aci(Uuid),
    Pni(Uuid),
}

impl ServiceId {
    /// Parses the string form; PNIs carry a `PNI:` prefix, ACIs are a bare UUID.
    pub fn parse_from_service_id_string(value: &str) -> Result<Self, AddressError> {
        let (kind, raw) = match value.strip_prefix("PNI:") {
            Some(raw) => (1, raw),
            None => (0, value),
        };
        let uuid = Uuid::parse_str(raw).map_err(|_| AddressError::InvalidServiceId)?;
        match kind {
            0 => Ok(Self::Aci(uuid)),
            _ => Ok(Self::Pni(uuid)),
        }
    }

    pub fn service_id_string(&self) -> String {
        match self {
            Self::Aci(uuid) => uuid.to_string(),
            Self::Pni(uuid) => format!("PNI:{uuid}"),
        }
    }

    pub fn raw_uuid(&self) -> Uuid {
        match self {
            Self::Aci(uuid) | Self::Pni(uuid) => *uuid,
        }
    }

    pub fn to_fixed_width_binary(self) -> [u8; SERVICE_ID_BINARY_SIZE] {
        let mut bytes = [0u8; SERVICE_ID_BINARY_SIZE];
        bytes[0] = match self {
            Self::Aci(_) => 0,
            Self::Pni(_) => 1,
        };
        bytes[1..].copy_from_slice(self.raw_uuid().as_bytes());
        bytes
    }

    pub fn from_fixed_width_binary(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() != SERVICE_ID_BINARY_SIZE {
            return Err(AddressError::InvalidServiceId);
        }
        let uuid = Uuid::from_slice(&bytes[1..]).map_err(|_| AddressError::InvalidServiceId)?;
        match bytes[0] {
            0 => Ok(Self::Aci(uuid)),
            1 => Ok(Self::Pni(uuid)),
            _ => Err(AddressError::InvalidServiceId),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.service_id_string())
    }
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("device id {value} outside of valid range 1..={MAX_DEVICE_ID}")]
    InvalidDeviceId { value: u32 },

    #[error("malformed service id")]
    InvalidServiceId,
}
