use crate::data_structures::{AccountId, AssetId, ChainFamily, Side};
use crate::errors::Result;
use crate::htlc::{felt, HashLock, SecretMaterial, TimeLocks};
use async_trait::async_trait;
use ethers::types::{Signature, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

// Transaction hash as reported by the chain's RPC
pub type TransactionId = String;

/// Identifier of an escrow on its chain, derived from the order hash.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowId(pub H256);

impl EscrowId {
    /// EVM chains key escrows by the full order hash; Cairo chains by its
    /// reduction into the felt range.
    pub fn for_family(family: ChainFamily, order_hash: H256) -> Self {
        match family {
            ChainFamily::Evm => EscrowId(order_hash),
            ChainFamily::Cairo => EscrowId(felt::reduce(&order_hash)),
        }
    }
}

impl fmt::Display for EscrowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Everything an escrow factory needs to create one leg of a swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowParams {
    pub side: Side,
    pub id: EscrowId,
    pub order_hash: H256,
    pub hashlock: HashLock,
    /// Owner of the locked principal; reclaims it on cancellation.
    pub depositor: AccountId,
    /// Receives the principal on withdrawal.
    pub recipient: AccountId,
    pub asset: AssetId,
    pub amount: u128,
    /// Paid in the chain's native asset by the submitting account.
    pub safety_deposit: u128,
    /// Source legs are anchored by the chain at inclusion; destination legs
    /// carry the anchor derived from the confirmed source deployment.
    pub timelocks: TimeLocks,
    /// Maker's signature over `order_hash`; required on the source leg, where
    /// the principal is pulled from the maker rather than the submitter.
    pub maker_signature: Option<Signature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    Confirmed { block_number: u64, timestamp: u64 },
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub id: EscrowId,
    pub timestamp: u64,
    pub principal: u128,
    pub safety_deposit: u128,
    pub timelocks: TimeLocks,
}

/// Emitted by a successful withdrawal; publishes the preimage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalEvent {
    pub id: EscrowId,
    pub caller: AccountId,
    pub secret: SecretMaterial,
    pub tx: TransactionId,
    pub timestamp: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    Created,
    Withdrawn,
    Cancelled,
}

/// Read-only view of an escrow's on-chain state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscrowSnapshot {
    pub id: EscrowId,
    pub side: Side,
    pub order_hash: H256,
    pub hashlock: HashLock,
    pub amount: u128,
    pub safety_deposit: u128,
    pub timelocks: TimeLocks,
    pub status: EscrowStatus,
}

/// A deployment the coordinator has seen confirmed on-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedDeployment {
    pub id: EscrowId,
    pub tx: Option<TransactionId>,
    pub timestamp: u64,
    pub timelocks: TimeLocks,
}

/// Interactions with one chain's escrow factory and token contracts.
///
/// Submission methods return as soon as the chain has accepted the
/// transaction; `wait_for_confirmation` reports inclusion. Every method is a
/// suspension point for the caller. Transient RPC failures surface as
/// `SwapError::ChainCallFailed`.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> u64;

    fn family(&self) -> ChainFamily;

    /// Address the escrow factory pulls approved principal through.
    fn escrow_factory(&self) -> AccountId;

    /// Timestamp of the latest block.
    async fn now(&self) -> Result<u64>;

    /// Resolves once a block at or after `timestamp` exists.
    async fn wait_until(&self, timestamp: u64) -> Result<()>;

    async fn balance_of(&self, account: &AccountId, asset: &AssetId) -> Result<u128>;

    /// What the escrow factory may still pull of `asset` from `owner`.
    async fn allowance(&self, owner: &AccountId, asset: &AssetId) -> Result<u128>;

    /// Grants the escrow factory `amount` more of `asset` from `owner`.
    async fn approve(&self, owner: &AccountId, asset: &AssetId, amount: u128) -> Result<TransactionId>;

    async fn deploy_escrow(&self, signer: &AccountId, params: EscrowParams) -> Result<TransactionId>;

    async fn withdraw(&self, signer: &AccountId, id: &EscrowId, secret: SecretMaterial) -> Result<TransactionId>;

    async fn cancel(&self, signer: &AccountId, id: &EscrowId) -> Result<TransactionId>;

    async fn wait_for_confirmation(&self, tx: &TransactionId) -> Result<Confirmation>;

    async fn get_deployment_event(&self, tx: &TransactionId) -> Result<DeploymentEvent>;

    /// `None` until a withdrawal of `id` has been confirmed.
    async fn get_withdrawal_event(&self, id: &EscrowId) -> Result<Option<WithdrawalEvent>>;

    /// `None` if no escrow with this identifier exists.
    async fn escrow_state(&self, id: &EscrowId) -> Result<Option<EscrowSnapshot>>;
}
