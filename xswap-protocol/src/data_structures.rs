use serde::{Deserialize, Serialize};
use std::fmt;

// Represent a user account on some chain
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountId {
    pub chain_id: u64,
    pub address: String, // Hex address; 20 bytes on EVM, a felt on Cairo chains
}

impl AccountId {
    pub fn new(chain_id: u64, address: impl Into<String>) -> Self {
        AccountId { chain_id, address: address.into() }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.chain_id)
    }
}

// Represent a specific asset on a specific chain
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetId {
    pub chain_id: u64,
    pub token_symbol: String, // e.g., "USDC", "STRK"
    pub token_address: String, // e.g., "0x..."
}

impl AssetId {
    pub fn new(chain_id: u64, token_symbol: impl Into<String>, token_address: impl Into<String>) -> Self {
        AssetId {
            chain_id,
            token_symbol: token_symbol.into(),
            token_address: token_address.into(),
        }
    }
}

/// Execution environment family of a chain. Decides how secrets and escrow
/// identifiers have to be encoded for it.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainFamily {
    /// 256-bit words; takes the secret as a single bytes32 argument.
    Evm,
    /// 252-bit field elements; takes the secret as two 128-bit halves.
    Cairo,
}

/// Which leg of the swap an escrow belongs to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Holds the maker's asset; the resolver withdraws it.
    Source,
    /// Holds the resolver's asset; the maker withdraws it.
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "src"),
            Side::Destination => write!(f, "dst"),
        }
    }
}
