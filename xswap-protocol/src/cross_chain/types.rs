// Types describing the progress and result of one cross-chain swap

use crate::errors::{Result, SwapError};
use crate::htlc::Secret;
use crate::onchain::interface::{ConfirmedDeployment, EscrowId, TransactionId};
use crate::order::SignedOrder;
use chrono::{DateTime, Utc};
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Why a swap ended through the cancellation paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbandonReason {
    /// The destination cancellation deadline passed before the secret was revealed.
    DestinationWindowExpired,
    /// The destination escrow could not be created.
    DestinationDeploymentFailed(String),
    /// The maker refused or failed to reveal against the destination escrow.
    RevealRejected(String),
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::DestinationWindowExpired => write!(f, "destination window expired before reveal"),
            AbandonReason::DestinationDeploymentFailed(reason) => {
                write!(f, "destination deployment failed: {}", reason)
            }
            AbandonReason::RevealRejected(reason) => write!(f, "secret not revealed: {}", reason),
        }
    }
}

/// Final result of a swap. Never partial: either both legs settled, both
/// were (or will only be) unwound through `cancel()`, or an error ended it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwapOutcome {
    Completed,
    Abandoned(AbandonReason),
    Failed(SwapError),
}

// Last step confirmed on-chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SwapPhase {
    Signed,
    SourceDeployed,
    DestinationDeployed,
    SecretRevealed,
    Completed,
    Abandoned,
}

/// Everything the coordinator knows about one swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSession {
    pub phase: SwapPhase,
    /// Held back until the maker reveals it on the destination chain.
    pub secret: Secret,
    pub signed_order: SignedOrder,
    pub src_escrow_id: EscrowId,
    pub dst_escrow_id: EscrowId,
    pub src_deployment: Option<ConfirmedDeployment>,
    pub dst_deployment: Option<ConfirmedDeployment>,
    pub dst_withdraw_tx: Option<TransactionId>,
    pub src_withdraw_tx: Option<TransactionId>,
    pub abandon_reason: Option<AbandonReason>,
}

impl SwapSession {
    pub fn order_hash(&self) -> H256 {
        self.signed_order.order_hash()
    }

    pub fn checkpoint(&self) -> SwapCheckpoint {
        SwapCheckpoint { saved_at: Utc::now(), session: self.clone() }
    }
}

/// Resumable snapshot of a session. A cache only: on resume the chains are
/// re-polled before anything is submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapCheckpoint {
    pub saved_at: DateTime<Utc>,
    pub session: SwapSession,
}

impl SwapCheckpoint {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let checkpoint: SwapCheckpoint = serde_json::from_str(raw)?;
        checkpoint.session.signed_order.verify().map_err(|e| {
            SwapError::Checkpoint(format!("checkpoint carries an invalid order signature: {}", e))
        })?;
        Ok(checkpoint)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// What `OrderCoordinator::execute_swap` hands back.
#[derive(Clone, Debug)]
pub struct SwapReport {
    pub outcome: SwapOutcome,
    /// `None` when the swap failed before an order was signed.
    pub session: Option<SwapSession>,
}

impl SwapReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == SwapOutcome::Completed
    }
}
