//! Per-leg HTLC escrow state machine.
//!
//! `Created --withdraw(secret)--> Withdrawn` and `Created --cancel()--> Cancelled`.
//! Both terminal states reject every further call with `AlreadyFinalized`.
//! The escrow computes the payouts of a transition; moving the balances is
//! left to the chain hosting it.

use crate::data_structures::{AccountId, AssetId, Side};
use crate::errors::{Result, SwapError};
use crate::htlc::{Deadlines, HashLock, Secret, Standing, TimeLocks};
use crate::onchain::interface::{EscrowId, EscrowSnapshot, EscrowStatus};
use ethers::types::H256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub to: AccountId,
    pub asset: AssetId,
    pub amount: u128,
}

#[derive(Clone, Debug)]
pub struct Escrow {
    pub id: EscrowId,
    pub side: Side,
    pub order_hash: H256,
    pub hashlock: HashLock,
    pub depositor: AccountId,
    pub recipient: AccountId,
    pub asset: AssetId,
    pub amount: u128,
    pub deposit_asset: AssetId,
    pub safety_deposit: u128,
    timelocks: TimeLocks,
    deployed_at: u64,
    deadlines: Deadlines,
    status: EscrowStatus,
}

impl Escrow {
    /// `timelocks` must already be anchored at the deployment timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EscrowId,
        side: Side,
        order_hash: H256,
        hashlock: HashLock,
        depositor: AccountId,
        recipient: AccountId,
        asset: AssetId,
        amount: u128,
        deposit_asset: AssetId,
        safety_deposit: u128,
        timelocks: TimeLocks,
    ) -> Result<Self> {
        let deadlines = timelocks.deadlines(side)?;
        let deployed_at = timelocks.deployed_at().unwrap_or_default();
        Ok(Escrow {
            id,
            side,
            order_hash,
            hashlock,
            depositor,
            recipient,
            asset,
            amount,
            deposit_asset,
            safety_deposit,
            timelocks,
            deployed_at,
            deadlines,
            status: EscrowStatus::Created,
        })
    }

    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    pub fn timelocks(&self) -> TimeLocks {
        self.timelocks
    }

    pub fn deadlines(&self) -> Deadlines {
        self.deadlines
    }

    fn standing_of(&self, caller: &AccountId) -> Standing {
        if *caller == self.recipient {
            Standing::Designated
        } else if *caller == self.depositor {
            Standing::Depositor
        } else {
            Standing::Anyone
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status {
            EscrowStatus::Created => Ok(()),
            EscrowStatus::Withdrawn | EscrowStatus::Cancelled => Err(SwapError::AlreadyFinalized),
        }
    }

    /// Releases the principal to the recipient and the safety deposit to `caller`.
    pub fn withdraw(&mut self, caller: &AccountId, secret: &Secret, now: u64) -> Result<Vec<Payout>> {
        self.ensure_open()?;
        if !self.hashlock.verify(secret) {
            return Err(SwapError::InvalidSecret);
        }
        if now < self.deployed_at {
            return Err(SwapError::NotYetWithdrawable);
        }
        if now >= self.deadlines.cancellation {
            return Err(SwapError::WithdrawalExpired);
        }
        if !self.deadlines.is_withdrawable_by(self.standing_of(caller), now) {
            return Err(SwapError::Unauthorized(format!(
                "{} may not withdraw {} escrow {} before {}",
                caller, self.side, self.id, self.deadlines.public_withdrawal
            )));
        }

        self.status = EscrowStatus::Withdrawn;
        Ok(vec![
            Payout { to: self.recipient.clone(), asset: self.asset.clone(), amount: self.amount },
            Payout { to: caller.clone(), asset: self.deposit_asset.clone(), amount: self.safety_deposit },
        ])
    }

    /// Returns the principal to the depositor and the safety deposit to `caller`.
    pub fn cancel(&mut self, caller: &AccountId, now: u64) -> Result<Vec<Payout>> {
        self.ensure_open()?;
        if now < self.deadlines.cancellation {
            return Err(SwapError::NotYetCancellable);
        }
        if !self.deadlines.is_cancellable_by(self.standing_of(caller), now) {
            return Err(SwapError::Unauthorized(match self.deadlines.public_cancellation {
                Some(public) => format!("{} may not cancel {} escrow {} before {}", caller, self.side, self.id, public),
                None => format!("only the depositor may cancel {} escrow {}", self.side, self.id),
            }));
        }

        self.status = EscrowStatus::Cancelled;
        Ok(vec![
            Payout { to: self.depositor.clone(), asset: self.asset.clone(), amount: self.amount },
            Payout { to: caller.clone(), asset: self.deposit_asset.clone(), amount: self.safety_deposit },
        ])
    }

    pub fn snapshot(&self) -> EscrowSnapshot {
        EscrowSnapshot {
            id: self.id,
            side: self.side,
            order_hash: self.order_hash,
            hashlock: self.hashlock,
            amount: self.amount,
            safety_deposit: self.safety_deposit,
            timelocks: self.timelocks,
            status: self.status,
        }
    }
}
