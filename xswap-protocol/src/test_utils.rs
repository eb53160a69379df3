// Shared fixtures: an EVM source chain and a Cairo destination chain on one
// simulated clock, with a funded maker and resolver on each.

use crate::config::SwapConfig;
use crate::cross_chain::signer::{ChainSigner, SwapCapabilities};
use crate::cross_chain::swap_coordinator::{OrderCoordinator, SwapRequest};
use crate::data_structures::{AccountId, AssetId, ChainFamily};
use crate::errors::{Result, SwapError};
use crate::onchain::chain_simulator::{ChainSimulator, SimClock};
use ethers::signers::{LocalWallet, Signer};
use std::sync::Arc;

// Anvil's first two dev accounts
pub const MAKER_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const RESOLVER_PRIVATE_KEY: &str = "59c6995e998f97a5300194dc6916aa8c096e6d7d7f81a78f05791c43177926b8";

// Starknet devnet predeployed accounts
pub const MAKER_CAIRO_ADDRESS: &str = "0x0260a8311b4f1092db620b923e8d7d20e76dedcc9ff24cbd0f2abae5d2efe5f4";
pub const RESOLVER_CAIRO_ADDRESS: &str = "0x0517ececd29116499f4a1b64b094da79ba08dfd54a3edaa316134c41f8160973";

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const INITIAL_TOKEN_BALANCE: u128 = 1_000_000_000_000;
pub const INITIAL_NATIVE_BALANCE: u128 = 1_000_000_000_000_000_000;

pub struct SimulatedEnvironment {
    pub config: SwapConfig,
    pub clock: SimClock,
    pub source: Arc<ChainSimulator>,
    pub destination: Arc<ChainSimulator>,
    pub maker_wallet: LocalWallet,
    pub maker_src: AccountId,
    pub maker_dst: AccountId,
    pub resolver_src: AccountId,
    pub resolver_dst: AccountId,
    /// Maker's asset on the source chain.
    pub src_token: AssetId,
    /// Resolver's asset on the destination chain.
    pub dst_token: AssetId,
    caps: SwapCapabilities,
}

fn parse_wallet(key: &str) -> Result<LocalWallet> {
    key.parse::<LocalWallet>().map_err(|e| SwapError::Config(format!("invalid test key: {}", e)))
}

impl SimulatedEnvironment {
    pub fn new(config: SwapConfig) -> Result<Self> {
        config.validate()?;
        let clock = SimClock::new(GENESIS_TIMESTAMP);
        let source = Arc::new(ChainSimulator::new(config.src_chain_id, ChainFamily::Evm, clock.clone()));
        let destination = Arc::new(ChainSimulator::new(config.dst_chain_id, ChainFamily::Cairo, clock.clone()));

        let maker_wallet = parse_wallet(MAKER_PRIVATE_KEY)?;
        let resolver_wallet = parse_wallet(RESOLVER_PRIVATE_KEY)?;
        let maker_src = AccountId::new(config.src_chain_id, format!("{:?}", maker_wallet.address()));
        let resolver_src = AccountId::new(config.src_chain_id, format!("{:?}", resolver_wallet.address()));
        let maker_dst = AccountId::new(config.dst_chain_id, MAKER_CAIRO_ADDRESS);
        let resolver_dst = AccountId::new(config.dst_chain_id, RESOLVER_CAIRO_ADDRESS);

        let src_token = AssetId::new(config.src_chain_id, "USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        let dst_token = AssetId::new(
            config.dst_chain_id,
            "USDC",
            "0x053c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8",
        );

        for account in [&maker_src, &resolver_src] {
            source.mint(account, &src_token, INITIAL_TOKEN_BALANCE);
            source.mint(account, source.native_asset(), INITIAL_NATIVE_BALANCE);
        }
        for account in [&maker_dst, &resolver_dst] {
            destination.mint(account, &dst_token, INITIAL_TOKEN_BALANCE);
            destination.mint(account, destination.native_asset(), INITIAL_NATIVE_BALANCE);
        }

        let caps = SwapCapabilities {
            maker_wallet: maker_wallet.clone(),
            maker_src: ChainSigner::new(maker_src.clone()),
            maker_dst: ChainSigner::new(maker_dst.clone()),
            resolver_src: ChainSigner::new(resolver_src.clone()),
            resolver_dst: ChainSigner::new(resolver_dst.clone()),
        };

        Ok(SimulatedEnvironment {
            config,
            clock,
            source,
            destination,
            maker_wallet,
            maker_src,
            maker_dst,
            resolver_src,
            resolver_dst,
            src_token,
            dst_token,
            caps,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(SwapConfig::default())
    }

    /// Capabilities sharing this environment's per-account transaction locks.
    pub fn capabilities(&self) -> SwapCapabilities {
        self.caps.clone()
    }

    pub fn coordinator(&self) -> Result<OrderCoordinator> {
        OrderCoordinator::new(
            self.config.clone(),
            self.source.clone(),
            self.destination.clone(),
            self.capabilities(),
        )
    }

    pub fn request(&self, making_amount: u128, taking_amount: u128) -> SwapRequest {
        SwapRequest {
            maker_asset: self.src_token.clone(),
            making_amount,
            taker_asset: self.dst_token.clone(),
            taking_amount,
            secret: None,
        }
    }

    pub fn src_balance(&self, account: &AccountId) -> u128 {
        self.source.balance(account, &self.src_token)
    }

    pub fn dst_balance(&self, account: &AccountId) -> u128 {
        self.destination.balance(account, &self.dst_token)
    }

    pub fn src_native(&self, account: &AccountId) -> u128 {
        self.source.balance(account, self.source.native_asset())
    }

    pub fn dst_native(&self, account: &AccountId) -> u128 {
        self.destination.balance(account, self.destination.native_asset())
    }
}

/// Fast retries and polling for tests.
pub fn test_config() -> SwapConfig {
    let mut config = SwapConfig::default();
    config.retry.initial_backoff = std::time::Duration::from_millis(1);
    config.retry.max_backoff = std::time::Duration::from_millis(5);
    config.confirmation_poll_interval = std::time::Duration::from_millis(1);
    config.confirmation_timeout = std::time::Duration::from_millis(200);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_is_funded_and_consistent() {
        let env = SimulatedEnvironment::new(test_config()).unwrap();
        assert_eq!(env.src_balance(&env.maker_src), INITIAL_TOKEN_BALANCE);
        assert_eq!(env.dst_balance(&env.resolver_dst), INITIAL_TOKEN_BALANCE);
        assert_eq!(env.dst_native(&env.resolver_dst), INITIAL_NATIVE_BALANCE);
        assert!(env.capabilities().maker_src_matches_wallet());
        assert_eq!(env.maker_src.address, "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        assert!(env.coordinator().is_ok());
    }
}
