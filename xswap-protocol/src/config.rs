use crate::errors::{Result, SwapError};
use crate::htlc::timelocks::{TimeLockConfig, TimeLocks};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SRC_CHAIN_ID: u64 = 1;
// Starknet devnet id used by the EVM<->Starknet harness
pub const DEFAULT_DST_CHAIN_ID: u64 = 1337;
pub const DEFAULT_SAFETY_DEPOSIT: u128 = 1_000_000_000_000_000; // 10^15 wei

/// Bounded exponential backoff applied to `ChainCallFailed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-indexed), capped at `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    // Chains
    pub src_chain_id: u64,
    pub dst_chain_id: u64,

    // Order terms applied to every swap
    pub timelocks: TimeLockConfig,
    pub src_safety_deposit: u128,
    pub dst_safety_deposit: u128,

    // Seconds between source confirmation and the destination anchor
    pub cross_chain_setup_delay_secs: u64,
    // Seconds the maker waits after the destination escrow is confirmed
    pub maker_reveal_delay_secs: u64,

    pub retry: RetryConfig,
    #[serde(with = "humantime_serde")]
    pub confirmation_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub confirmation_timeout: Duration,

    pub log_level: String,
}

impl Default for SwapConfig {
    fn default() -> Self {
        SwapConfig {
            src_chain_id: DEFAULT_SRC_CHAIN_ID,
            dst_chain_id: DEFAULT_DST_CHAIN_ID,
            timelocks: TimeLockConfig::default(),
            src_safety_deposit: DEFAULT_SAFETY_DEPOSIT,
            dst_safety_deposit: DEFAULT_SAFETY_DEPOSIT,
            cross_chain_setup_delay_secs: 5,
            maker_reveal_delay_secs: 3,
            retry: RetryConfig::default(),
            confirmation_poll_interval: Duration::from_millis(200),
            confirmation_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
        }
    }
}

impl SwapConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: SwapConfig =
            serde_json::from_str(raw).map_err(|e| SwapError::Config(format!("invalid config json: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SwapError::Config(format!("cannot read {}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        TimeLocks::new(self.timelocks)?;
        if self.src_chain_id == self.dst_chain_id {
            return Err(SwapError::Config(format!(
                "source and destination chain ids are both {}",
                self.src_chain_id
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(SwapError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if !(self.retry.multiplier >= 1.0 && self.retry.multiplier.is_finite()) {
            return Err(SwapError::Config(format!(
                "retry.multiplier must be a finite value of at least 1, got {}",
                self.retry.multiplier
            )));
        }
        if self.confirmation_poll_interval.is_zero() || self.confirmation_poll_interval > self.confirmation_timeout {
            return Err(SwapError::Config(
                "confirmation_poll_interval must be non-zero and within confirmation_timeout".to_string(),
            ));
        }
        self.log_level_filter()?;
        Ok(())
    }

    pub fn time_locks(&self) -> Result<TimeLocks> {
        TimeLocks::new(self.timelocks)
    }

    pub fn log_level_filter(&self) -> Result<log::LevelFilter> {
        log::LevelFilter::from_str(&self.log_level)
            .map_err(|_| SwapError::Config(format!("unknown log level '{}'", self.log_level)))
    }
}
