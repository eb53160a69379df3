// Signing capabilities handed to the coordinator.
//
// A chain account sends one transaction at a time. Clones of a `ChainSigner`
// share the same in-flight lock, so swaps running concurrently on behalf of
// the same account queue behind each other on that chain only. A second
// lock covers funding, so one swap's approval is spent by its own escrow.

use crate::data_structures::AccountId;
use ethers::signers::{LocalWallet, Signer};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Clone, Debug)]
pub struct ChainSigner {
    account: AccountId,
    in_flight: Arc<Mutex<()>>,
    funding: Arc<Mutex<()>>,
}

impl ChainSigner {
    pub fn new(account: AccountId) -> Self {
        ChainSigner { account, in_flight: Arc::new(Mutex::new(())), funding: Arc::new(Mutex::new(())) }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.account.chain_id
    }

    /// Held from submission until the transaction is confirmed.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.in_flight.lock().await
    }

    /// Held from approval until the escrow that spends it is confirmed.
    pub async fn acquire_funding(&self) -> MutexGuard<'_, ()> {
        self.funding.lock().await
    }
}

/// Authorities the coordinator acts with: the maker's order-signing wallet
/// and one transaction signer per actor and chain.
#[derive(Clone, Debug)]
pub struct SwapCapabilities {
    pub maker_wallet: LocalWallet,
    pub maker_src: ChainSigner,
    pub maker_dst: ChainSigner,
    pub resolver_src: ChainSigner,
    pub resolver_dst: ChainSigner,
}

impl SwapCapabilities {
    pub fn maker_wallet_address(&self) -> ethers::types::Address {
        self.maker_wallet.address()
    }

    /// The maker's source account must be the wallet that signs orders.
    pub fn maker_src_matches_wallet(&self) -> bool {
        self.maker_src
            .account()
            .address
            .parse::<ethers::types::Address>()
            .map(|address| address == self.maker_wallet.address())
            .unwrap_or(false)
    }
}
