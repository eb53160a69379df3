//! Reduction of 256-bit digests into the Cairo felt range.
//!
//! The destination escrow is keyed by the order hash, but a felt252 cannot hold
//! every 256-bit value. The identifier used there is the order hash modulo
//! 2^251 + 17 * 2^192, which sits one below the Stark prime, so every residue
//! is a canonical felt. Distinct order hashes can share a residue; collisions
//! are rejected when the escrow is created.

use ethers::types::{H256, U256};

/// 2^251 + 17 * 2^192
pub fn reduction_modulus() -> U256 {
    (U256::one() << 251usize) + (U256::from(17u8) << 192usize)
}

/// The Stark field prime, 2^251 + 17 * 2^192 + 1.
pub fn stark_prime() -> U256 {
    reduction_modulus() + U256::one()
}

pub fn reduce(digest: &H256) -> H256 {
    let value = U256::from_big_endian(digest.as_bytes()) % reduction_modulus();
    u256_to_h256(value)
}

/// Whether the word is a valid felt252 value.
pub fn is_felt(word: &H256) -> bool {
    U256::from_big_endian(word.as_bytes()) < stark_prime()
}

pub(crate) fn u256_to_h256(value: U256) -> H256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    H256::from(bytes)
}
