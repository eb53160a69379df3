//! Error taxonomy shared by the escrow state machine, the chain adapters and
//! the swap coordinator.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapError {
    /// Malformed timelock configuration (non-monotonic or out of range offsets).
    #[error("Invalid timelock ordering: {0}")]
    InvalidOrdering(String),

    /// Secret does not hash to the escrow's hashlock.
    #[error("Secret does not match hashlock")]
    InvalidSecret,

    /// Secret material was encoded for a different chain family.
    #[error("Secret encoding rejected: {0}")]
    SecretEncoding(String),

    #[error("Escrow is not yet withdrawable")]
    NotYetWithdrawable,

    #[error("Withdrawal window has expired")]
    WithdrawalExpired,

    #[error("Escrow is not yet cancellable")]
    NotYetCancellable,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Escrow already finalized")]
    AlreadyFinalized,

    /// Transient RPC or transaction failure. The only retryable kind.
    #[error("Chain call failed: {0}")]
    ChainCallFailed(String),

    #[error("Causal ordering violation: {0}")]
    CausalOrderingViolation(String),

    #[error("Escrow identifier collision: {0}")]
    EscrowIdCollision(String),

    #[error("Escrow not found: {0}")]
    EscrowNotFound(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

impl SwapError {
    /// Whether the failed step may be retried with the same parameters.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::ChainCallFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, SwapError>;

impl From<serde_json::Error> for SwapError {
    fn from(err: serde_json::Error) -> Self {
        SwapError::Checkpoint(err.to_string())
    }
}

impl From<std::io::Error> for SwapError {
    fn from(err: std::io::Error) -> Self {
        SwapError::Checkpoint(err.to_string())
    }
}
