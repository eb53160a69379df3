//! Hashlock commitment over the swap secret.
//!
//! Both legs must verify the same digest bit for bit, so the digest is
//! keccak-256 of the full 32-byte secret on every chain. Cairo escrows recombine
//! the split secret and call their keccak builtin instead of a native Pedersen
//! or Poseidon hash.

use crate::htlc::secret::Secret;
use ethers::types::H256;
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashLock(H256);

impl HashLock {
    pub fn for_secret(secret: &Secret) -> Self {
        HashLock(H256::from(keccak256(secret.as_bytes())))
    }

    pub fn from_digest(digest: H256) -> Self {
        HashLock(digest)
    }

    pub fn digest(&self) -> H256 {
        self.0
    }

    /// Recomputes the digest of `secret` and compares it without early exit.
    pub fn verify(&self, secret: &Secret) -> bool {
        let candidate = keccak256(secret.as_bytes());
        let diff = candidate
            .iter()
            .zip(self.0.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        diff == 0
    }
}

impl fmt::Display for HashLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable() {
        let secret = Secret::random();
        assert_eq!(HashLock::for_secret(&secret), HashLock::for_secret(&secret));
    }

    #[test]
    fn matches_keccak_of_zero_secret() {
        // keccak256(bytes32(0))
        let lock = HashLock::for_secret(&Secret::from_bytes([0u8; 32]));
        assert_eq!(
            format!("{:?}", lock.digest()),
            "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
    }

    #[test]
    fn verify_accepts_preimage_and_rejects_others() {
        let secret = Secret::random();
        let lock = HashLock::for_secret(&secret);
        assert!(lock.verify(&secret));
        assert!(lock.verify(&secret.split().join()));
        assert!(!lock.verify(&Secret::random()));
    }

    #[test]
    fn verify_is_sensitive_to_a_single_bit() {
        let mut bytes = [7u8; 32];
        let lock = HashLock::for_secret(&Secret::from_bytes(bytes));
        bytes[31] ^= 1;
        assert!(!lock.verify(&Secret::from_bytes(bytes)));
    }
}
