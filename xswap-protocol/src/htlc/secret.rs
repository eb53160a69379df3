//! Swap secret and the codec that adapts it to each chain's calling convention.
//!
//! The maker picks a 32-byte secret before the order exists. EVM escrows take
//! it as one `bytes32` argument; Cairo escrows cannot take a 256-bit value in a
//! single felt, so the destination entry point receives two 16-byte halves and
//! rejoins them before hashing. Splitting is a pure boundary adapter: it adds
//! no hashing step and `join(split(s)) == s` for every secret.

use crate::data_structures::ChainFamily;
use crate::errors::{Result, SwapError};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const SECRET_LEN: usize = 32;
pub const SECRET_PART_LEN: usize = SECRET_LEN / 2;

/// 32-byte preimage of the hashlock.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    /// Draws a fresh secret from the OS entropy source.
    pub fn random() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Secret(bytes)
    }

    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Secret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        let raw = hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| SwapError::SecretEncoding(format!("secret is not hex: {}", e)))?;
        let bytes: [u8; SECRET_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            SwapError::SecretEncoding(format!("secret must be {} bytes, got {}", SECRET_LEN, raw.len()))
        })?;
        Ok(Secret(bytes))
    }

    /// First and second halves, in that order.
    pub fn split(&self) -> SplitSecret {
        let mut part1 = [0u8; SECRET_PART_LEN];
        let mut part2 = [0u8; SECRET_PART_LEN];
        part1.copy_from_slice(&self.0[..SECRET_PART_LEN]);
        part2.copy_from_slice(&self.0[SECRET_PART_LEN..]);
        SplitSecret { part1, part2 }
    }
}

// Never print the preimage; a leaked log line is a leaked swap.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Secret::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// The secret as two 16-byte halves, each small enough for one felt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSecret {
    pub part1: [u8; SECRET_PART_LEN],
    pub part2: [u8; SECRET_PART_LEN],
}

impl SplitSecret {
    pub fn join(&self) -> Secret {
        let mut bytes = [0u8; SECRET_LEN];
        bytes[..SECRET_PART_LEN].copy_from_slice(&self.part1);
        bytes[SECRET_PART_LEN..].copy_from_slice(&self.part2);
        Secret(bytes)
    }

    /// Big-endian integer value of each half, as passed in Cairo calldata.
    pub fn as_felts(&self) -> (u128, u128) {
        (u128::from_be_bytes(self.part1), u128::from_be_bytes(self.part2))
    }

    pub fn from_felts(part1: u128, part2: u128) -> Self {
        SplitSecret {
            part1: part1.to_be_bytes(),
            part2: part2.to_be_bytes(),
        }
    }
}

/// Secret argument of a withdraw call, encoded for the target chain family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretMaterial {
    Full(Secret),
    Split(SplitSecret),
}

impl SecretMaterial {
    pub fn for_family(family: ChainFamily, secret: &Secret) -> Self {
        match family {
            ChainFamily::Evm => SecretMaterial::Full(secret.clone()),
            ChainFamily::Cairo => SecretMaterial::Split(secret.split()),
        }
    }

    /// The family whose withdraw entry point accepts this encoding.
    pub fn family(&self) -> ChainFamily {
        match self {
            SecretMaterial::Full(_) => ChainFamily::Evm,
            SecretMaterial::Split(_) => ChainFamily::Cairo,
        }
    }

    pub fn to_secret(&self) -> Secret {
        match self {
            SecretMaterial::Full(secret) => secret.clone(),
            SecretMaterial::Split(parts) => parts.join(),
        }
    }
}
