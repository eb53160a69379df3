//! Relative timelock offsets and the withdrawal/cancellation windows they open.
//!
//! Offsets are seconds counted from an escrow's deployment. The source leg has
//! four stages, the destination leg three. Within a leg the stages are
//! non-decreasing:
//!
//! ```text
//!  deployed      withdrawal    public_withdrawal   cancellation   public_cancellation (src)
//!     |-- designated only --|-- designated only --|-- anyone ----|-- depositor --|-- anyone -->
//!     \________________ withdraw(secret) _________________________/\_____________ cancel() ___/
//! ```
//!
//! The packed form mirrors the on-chain layout: seven 32-bit offsets (stage
//! index 0..6) with the deployment timestamp in bits 224..256.

use crate::data_structures::Side;
use crate::errors::{Result, SwapError};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

const STAGE_BITS: usize = 32;
const DEPLOYED_AT_OFFSET: usize = 224;

/// Seconds after deployment at which each stage begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLockConfig {
    pub src_withdrawal: u64,
    pub src_public_withdrawal: u64,
    pub src_cancellation: u64,
    pub src_public_cancellation: u64,
    pub dst_withdrawal: u64,
    pub dst_public_withdrawal: u64,
    pub dst_cancellation: u64,
}

impl Default for TimeLockConfig {
    fn default() -> Self {
        TimeLockConfig {
            src_withdrawal: 10,
            src_public_withdrawal: 120,
            src_cancellation: 121,
            src_public_cancellation: 122,
            dst_withdrawal: 10,
            dst_public_withdrawal: 100,
            dst_cancellation: 101,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    SrcWithdrawal = 0,
    SrcPublicWithdrawal = 1,
    SrcCancellation = 2,
    SrcPublicCancellation = 3,
    DstWithdrawal = 4,
    DstPublicWithdrawal = 5,
    DstCancellation = 6,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::SrcWithdrawal,
        Stage::SrcPublicWithdrawal,
        Stage::SrcCancellation,
        Stage::SrcPublicCancellation,
        Stage::DstWithdrawal,
        Stage::DstPublicWithdrawal,
        Stage::DstCancellation,
    ];
}

/// Standing of a caller relative to an escrow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Standing {
    /// The counterparty the escrow releases its principal to.
    Designated,
    /// The party whose principal is locked.
    Depositor,
    /// Any other account.
    Anyone,
}

/// Absolute timestamps (seconds) of one leg's stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub withdrawal: u64,
    pub public_withdrawal: u64,
    pub cancellation: u64,
    /// Only the source leg opens cancellation to everyone.
    pub public_cancellation: Option<u64>,
}

impl Deadlines {
    /// Withdrawal is open to the designated counterparty until cancellation,
    /// and to anyone holding the secret from `public_withdrawal` on.
    pub fn is_withdrawable_by(&self, actor: Standing, now: u64) -> bool {
        if now >= self.cancellation {
            return false;
        }
        if now >= self.public_withdrawal {
            return true;
        }
        actor == Standing::Designated
    }

    pub fn is_cancellable_by(&self, actor: Standing, now: u64) -> bool {
        if now < self.cancellation {
            return false;
        }
        match self.public_cancellation {
            Some(public) if now >= public => true,
            _ => actor == Standing::Depositor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLocks {
    offsets: TimeLockConfig,
    deployed_at: Option<u64>,
}

impl TimeLocks {
    pub fn new(config: TimeLockConfig) -> Result<Self> {
        Self::validate(&config)?;
        Ok(TimeLocks { offsets: config, deployed_at: None })
    }

    fn validate(c: &TimeLockConfig) -> Result<()> {
        let src = [
            ("src_withdrawal", c.src_withdrawal),
            ("src_public_withdrawal", c.src_public_withdrawal),
            ("src_cancellation", c.src_cancellation),
            ("src_public_cancellation", c.src_public_cancellation),
        ];
        let dst = [
            ("dst_withdrawal", c.dst_withdrawal),
            ("dst_public_withdrawal", c.dst_public_withdrawal),
            ("dst_cancellation", c.dst_cancellation),
        ];
        for side in [&src[..], &dst[..]] {
            for pair in side.windows(2) {
                let (prev_name, prev) = pair[0];
                let (next_name, next) = pair[1];
                if next < prev {
                    return Err(SwapError::InvalidOrdering(format!(
                        "{} ({}) precedes {} ({})",
                        next_name, next, prev_name, prev
                    )));
                }
            }
        }
        for (name, offset) in src.iter().chain(dst.iter()) {
            if *offset > u64::from(u32::MAX) {
                return Err(SwapError::InvalidOrdering(format!("{} ({}) exceeds 32 bits", name, offset)));
            }
        }
        // A resolver must be able to reclaim the destination leg before the
        // maker can reclaim the source leg.
        if c.dst_cancellation > c.src_cancellation {
            return Err(SwapError::InvalidOrdering(format!(
                "dst_cancellation ({}) is after src_cancellation ({})",
                c.dst_cancellation, c.src_cancellation
            )));
        }
        Ok(())
    }

    pub fn offsets(&self) -> &TimeLockConfig {
        &self.offsets
    }

    pub fn offset(&self, stage: Stage) -> u64 {
        let c = &self.offsets;
        match stage {
            Stage::SrcWithdrawal => c.src_withdrawal,
            Stage::SrcPublicWithdrawal => c.src_public_withdrawal,
            Stage::SrcCancellation => c.src_cancellation,
            Stage::SrcPublicCancellation => c.src_public_cancellation,
            Stage::DstWithdrawal => c.dst_withdrawal,
            Stage::DstPublicWithdrawal => c.dst_public_withdrawal,
            Stage::DstCancellation => c.dst_cancellation,
        }
    }

    pub fn deployed_at(&self) -> Option<u64> {
        self.deployed_at
    }

    /// Anchors the offsets at a confirmed deployment timestamp.
    pub fn with_deployed_at(mut self, timestamp: u64) -> Self {
        self.deployed_at = Some(timestamp);
        self
    }

    pub fn to_source_deadlines(&self, deployment_timestamp: u64) -> Deadlines {
        let c = &self.offsets;
        Deadlines {
            withdrawal: deployment_timestamp.saturating_add(c.src_withdrawal),
            public_withdrawal: deployment_timestamp.saturating_add(c.src_public_withdrawal),
            cancellation: deployment_timestamp.saturating_add(c.src_cancellation),
            public_cancellation: Some(deployment_timestamp.saturating_add(c.src_public_cancellation)),
        }
    }

    pub fn to_destination_deadlines(&self, deployment_timestamp: u64) -> Deadlines {
        let c = &self.offsets;
        Deadlines {
            withdrawal: deployment_timestamp.saturating_add(c.dst_withdrawal),
            public_withdrawal: deployment_timestamp.saturating_add(c.dst_public_withdrawal),
            cancellation: deployment_timestamp.saturating_add(c.dst_cancellation),
            public_cancellation: None,
        }
    }

    /// Deadlines of `side`, available once the deployment timestamp is known.
    pub fn deadlines(&self, side: Side) -> Result<Deadlines> {
        let deployed_at = self.deployed_at.ok_or_else(|| {
            SwapError::CausalOrderingViolation(format!("{} deadlines requested before deployment", side))
        })?;
        Ok(match side {
            Side::Source => self.to_source_deadlines(deployed_at),
            Side::Destination => self.to_destination_deadlines(deployed_at),
        })
    }

    pub fn is_withdrawable_by(&self, actor: Standing, now: u64, side: Side) -> Result<bool> {
        Ok(self.deadlines(side)?.is_withdrawable_by(actor, now))
    }

    pub fn is_cancellable_by(&self, actor: Standing, now: u64, side: Side) -> Result<bool> {
        Ok(self.deadlines(side)?.is_cancellable_by(actor, now))
    }

    /// The seven stage offsets packed without the deployment timestamp, as
    /// committed to by a signed order.
    pub fn encode_offsets(&self) -> U256 {
        let mut packed = U256::zero();
        for stage in Stage::ALL {
            packed = packed | (U256::from(self.offset(stage)) << (stage as usize * STAGE_BITS));
        }
        packed
    }

    pub fn encode(&self) -> Result<U256> {
        let mut packed = self.encode_offsets();
        if let Some(deployed_at) = self.deployed_at {
            if deployed_at > u64::from(u32::MAX) {
                return Err(SwapError::InvalidOrdering(format!(
                    "deployment timestamp {} exceeds 32 bits",
                    deployed_at
                )));
            }
            packed = packed | (U256::from(deployed_at) << DEPLOYED_AT_OFFSET);
        }
        Ok(packed)
    }

    pub fn decode(packed: U256) -> Result<Self> {
        let mask = U256::from(u32::MAX);
        let word = |shift: usize| ((packed >> shift) & mask).as_u64();
        let config = TimeLockConfig {
            src_withdrawal: word(0),
            src_public_withdrawal: word(STAGE_BITS),
            src_cancellation: word(2 * STAGE_BITS),
            src_public_cancellation: word(3 * STAGE_BITS),
            dst_withdrawal: word(4 * STAGE_BITS),
            dst_public_withdrawal: word(5 * STAGE_BITS),
            dst_cancellation: word(6 * STAGE_BITS),
        };
        let timelocks = TimeLocks::new(config)?;
        Ok(match word(DEPLOYED_AT_OFFSET) {
            0 => timelocks,
            deployed_at => timelocks.with_deployed_at(deployed_at),
        })
    }
}
