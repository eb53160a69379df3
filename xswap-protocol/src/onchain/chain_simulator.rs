// In-process chain hosting an escrow factory, fungible balances and a clock.

use crate::data_structures::{AccountId, AssetId, ChainFamily, Side};
use crate::errors::{Result, SwapError};
use crate::htlc::{felt, SecretMaterial};
use crate::onchain::escrow_contract::{Escrow, Payout};
use crate::onchain::interface::{
    ChainAdapter, Confirmation, DeploymentEvent, EscrowId, EscrowParams, EscrowSnapshot, TransactionId,
    WithdrawalEvent,
};
use async_trait::async_trait;
use ethers::types::Address;
use ethers::utils::keccak256;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Wall clock shared by simulated chains. Only moves forward.
#[derive(Clone, Debug)]
pub struct SimClock(Arc<AtomicU64>);

impl SimClock {
    pub fn new(start: u64) -> Self {
        SimClock(Arc::new(AtomicU64::new(start)))
    }

    pub fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance_to(&self, timestamp: u64) {
        self.0.fetch_max(timestamp, Ordering::SeqCst);
    }

    pub fn advance_by(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
struct Receipt {
    block_number: u64,
    timestamp: u64,
    revert_reason: Option<String>,
}

// Injected faults, consumed one per submission
#[derive(Debug, Default)]
struct Faults {
    fail_submissions: u32,
    lose_responses: u32,
    revert_transactions: u32,
}

#[derive(Debug, Default)]
struct ChainState {
    balances: HashMap<(AccountId, AssetId), u128>,
    allowances: HashMap<(AccountId, AssetId), u128>,
    escrows: HashMap<EscrowId, Escrow>,
    block_number: u64,
    tx_counter: u64,
    receipts: HashMap<TransactionId, Receipt>,
    deployments: HashMap<TransactionId, DeploymentEvent>,
    withdrawals: HashMap<EscrowId, WithdrawalEvent>,
    faults: Faults,
}

impl ChainState {
    fn balance(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.balances.get(&(account.clone(), asset.clone())).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &AccountId, asset: &AssetId) -> u128 {
        self.allowances.get(&(owner.clone(), asset.clone())).copied().unwrap_or(0)
    }

    // Checks all debits together so that nothing is applied unless everything fits.
    fn check_debits(&self, debits: &[(&AccountId, &AssetId, u128)]) -> Result<()> {
        let mut needed: HashMap<(AccountId, AssetId), u128> = HashMap::new();
        for (account, asset, amount) in debits {
            let entry = needed.entry(((*account).clone(), (*asset).clone())).or_insert(0);
            *entry = entry.saturating_add(*amount);
        }
        for ((account, asset), amount) in needed {
            let available = self.balance(&account, &asset);
            if available < amount {
                return Err(SwapError::InsufficientFunds(format!(
                    "{} holds {} {}, needs {}",
                    account, available, asset.token_symbol, amount
                )));
            }
        }
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, asset: &AssetId, amount: u128) {
        let entry = self.balances.entry((account.clone(), asset.clone())).or_insert(0);
        *entry = entry.saturating_sub(amount);
    }

    fn credit(&mut self, payout: &Payout) {
        let entry = self.balances.entry((payout.to.clone(), payout.asset.clone())).or_insert(0);
        *entry = entry.saturating_add(payout.amount);
    }
}

#[derive(Debug)]
pub struct ChainSimulator {
    chain_id: u64,
    family: ChainFamily,
    clock: SimClock,
    factory: AccountId,
    native_asset: AssetId,
    state: Mutex<ChainState>,
}

impl ChainSimulator {
    pub fn new(chain_id: u64, family: ChainFamily, clock: SimClock) -> Self {
        let (factory, native_asset) = match family {
            ChainFamily::Evm => (
                AccountId::new(chain_id, "0x5fbdb2315678afecb367f032d93f642f64180aa3"),
                AssetId::new(chain_id, "ETH", "native"),
            ),
            ChainFamily::Cairo => (
                AccountId::new(chain_id, "0x0049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc"),
                AssetId::new(
                    chain_id,
                    "STRK",
                    "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d",
                ),
            ),
        };
        ChainSimulator {
            chain_id,
            family,
            clock,
            factory,
            native_asset,
            state: Mutex::new(ChainState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Asset safety deposits are paid in.
    pub fn native_asset(&self) -> &AssetId {
        &self.native_asset
    }

    pub fn mint(&self, account: &AccountId, asset: &AssetId, amount: u128) {
        let mut state = self.state();
        state.credit(&Payout { to: account.clone(), asset: asset.clone(), amount });
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.state().balance(account, asset)
    }

    pub fn block_number(&self) -> u64 {
        self.state().block_number
    }

    pub fn escrow(&self, id: &EscrowId) -> Option<EscrowSnapshot> {
        self.state().escrows.get(id).map(Escrow::snapshot)
    }

    /// The next `n` submissions are rejected before reaching the chain.
    pub fn fail_next_submissions(&self, n: u32) {
        self.state().faults.fail_submissions += n;
    }

    /// The next `n` submissions are executed but the caller gets an error.
    pub fn lose_next_responses(&self, n: u32) {
        self.state().faults.lose_responses += n;
    }

    /// The next `n` transactions are included but revert without effect.
    pub fn revert_next_transactions(&self, n: u32) {
        self.state().faults.revert_transactions += n;
    }

    fn check_chain(&self, what: &str, chain_id: u64) -> Result<()> {
        if chain_id != self.chain_id {
            return Err(SwapError::InvalidOrder(format!(
                "{} belongs to chain {}, not {}",
                what, chain_id, self.chain_id
            )));
        }
        Ok(())
    }

    /// Runs `execute` as one transaction in a new block. `execute` must
    /// validate before mutating; an `Err` leaves the state untouched and is
    /// reported to the submitter like a failed gas estimation.
    fn submit<F>(&self, label: &str, execute: F) -> Result<TransactionId>
    where
        F: FnOnce(&mut ChainState, u64, &TransactionId) -> Result<()>,
    {
        let mut state = self.state();
        if state.faults.fail_submissions > 0 {
            state.faults.fail_submissions -= 1;
            warn!("[ChainSim {}] Dropping {} submission (injected RPC failure)", self.chain_id, label);
            return Err(SwapError::ChainCallFailed(format!("chain {}: rpc unavailable", self.chain_id)));
        }

        state.tx_counter += 1;
        let seed = format!("{}:{}:{}", self.chain_id, state.tx_counter, label);
        let tx = format!("0x{}", hex::encode(keccak256(seed.as_bytes())));
        let now = self.clock.now();

        let revert_reason = if state.faults.revert_transactions > 0 {
            state.faults.revert_transactions -= 1;
            Some("execution reverted".to_string())
        } else {
            execute(&mut *state, now, &tx)?;
            None
        };

        state.block_number += 1;
        let block_number = state.block_number;
        match &revert_reason {
            Some(reason) => warn!("[ChainSim {}] {} {} reverted in block {}: {}", self.chain_id, label, tx, block_number, reason),
            None => debug!("[ChainSim {}] {} {} included in block {} at {}", self.chain_id, label, tx, block_number, now),
        }
        state.receipts.insert(tx.clone(), Receipt { block_number, timestamp: now, revert_reason });

        if state.faults.lose_responses > 0 {
            state.faults.lose_responses -= 1;
            warn!("[ChainSim {}] Losing response for {} (injected)", self.chain_id, tx);
            return Err(SwapError::ChainCallFailed(format!("chain {}: connection reset", self.chain_id)));
        }
        Ok(tx)
    }

    fn execute_deploy(&self, state: &mut ChainState, signer: &AccountId, params: EscrowParams, now: u64, tx: &TransactionId) -> Result<()> {
        self.check_chain("signer", signer.chain_id)?;
        self.check_chain("escrow asset", params.asset.chain_id)?;
        self.check_chain("depositor", params.depositor.chain_id)?;
        self.check_chain("recipient", params.recipient.chain_id)?;

        if params.id != EscrowId::for_family(self.family, params.order_hash) {
            return Err(SwapError::InvalidOrder(format!(
                "escrow id {} is not derived from order hash {:?}",
                params.id, params.order_hash
            )));
        }
        if self.family == ChainFamily::Cairo && !felt::is_felt(&params.id.0) {
            return Err(SwapError::InvalidOrder(format!("escrow id {} is not a felt", params.id)));
        }
        if state.escrows.contains_key(&params.id) {
            return Err(SwapError::EscrowIdCollision(format!(
                "chain {} already has escrow {}",
                self.chain_id, params.id
            )));
        }

        // Pulling principal from someone other than the submitter needs the owner's signature.
        if *signer != params.depositor {
            let signature = params.maker_signature.as_ref().ok_or_else(|| {
                SwapError::InvalidSignature(format!("no signature from depositor {}", params.depositor))
            })?;
            let owner: Address = params.depositor.address.parse().map_err(|_| {
                SwapError::InvalidSignature(format!("depositor {} is not an EVM address", params.depositor))
            })?;
            signature
                .verify(params.order_hash, owner)
                .map_err(|e| SwapError::InvalidSignature(e.to_string()))?;
        }

        let timelocks = match params.side {
            Side::Source => params.timelocks.with_deployed_at(now),
            Side::Destination => params.timelocks,
        };

        let allowance = state.allowance(&params.depositor, &params.asset);
        if allowance < params.amount {
            return Err(SwapError::InsufficientFunds(format!(
                "{} approved {} {} to the factory, needs {}",
                params.depositor, allowance, params.asset.token_symbol, params.amount
            )));
        }
        state.check_debits(&[
            (&params.depositor, &params.asset, params.amount),
            (signer, &self.native_asset, params.safety_deposit),
        ])?;

        let escrow = Escrow::new(
            params.id,
            params.side,
            params.order_hash,
            params.hashlock,
            params.depositor.clone(),
            params.recipient.clone(),
            params.asset.clone(),
            params.amount,
            self.native_asset.clone(),
            params.safety_deposit,
            timelocks,
        )?;
        let deployed_at = timelocks.deployed_at().unwrap_or(now);

        state.allowances.insert((params.depositor.clone(), params.asset.clone()), allowance - params.amount);
        state.debit(&params.depositor, &params.asset, params.amount);
        state.debit(signer, &self.native_asset, params.safety_deposit);
        state.escrows.insert(params.id, escrow);
        state.deployments.insert(
            tx.clone(),
            DeploymentEvent {
                id: params.id,
                timestamp: deployed_at,
                principal: params.amount,
                safety_deposit: params.safety_deposit,
                timelocks,
            },
        );
        info!(
            "[ChainSim {}] {} escrow {} created: {} {} locked, anchored at {}",
            self.chain_id, params.side, params.id, params.amount, params.asset.token_symbol, deployed_at
        );
        Ok(())
    }
}

#[async_trait]
impl ChainAdapter for ChainSimulator {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn family(&self) -> ChainFamily {
        self.family
    }

    fn escrow_factory(&self) -> AccountId {
        self.factory.clone()
    }

    async fn now(&self) -> Result<u64> {
        Ok(self.clock.now())
    }

    async fn wait_until(&self, timestamp: u64) -> Result<()> {
        if self.clock.now() < timestamp {
            debug!("[ChainSim {}] Advancing clock to {}", self.chain_id, timestamp);
            self.clock.advance_to(timestamp);
        }
        Ok(())
    }

    async fn balance_of(&self, account: &AccountId, asset: &AssetId) -> Result<u128> {
        Ok(self.balance(account, asset))
    }

    async fn allowance(&self, owner: &AccountId, asset: &AssetId) -> Result<u128> {
        Ok(self.state().allowance(owner, asset))
    }

    async fn approve(&self, owner: &AccountId, asset: &AssetId, amount: u128) -> Result<TransactionId> {
        self.check_chain("owner", owner.chain_id)?;
        self.check_chain("asset", asset.chain_id)?;
        self.submit("approve", |state, _, _| {
            let entry = state.allowances.entry((owner.clone(), asset.clone())).or_insert(0);
            *entry = entry.saturating_add(amount);
            Ok(())
        })
    }

    async fn deploy_escrow(&self, signer: &AccountId, params: EscrowParams) -> Result<TransactionId> {
        self.submit("deploy_escrow", |state, now, tx| self.execute_deploy(state, signer, params, now, tx))
    }

    async fn withdraw(&self, signer: &AccountId, id: &EscrowId, secret: SecretMaterial) -> Result<TransactionId> {
        if secret.family() != self.family {
            return Err(SwapError::SecretEncoding(format!(
                "chain {} expects {:?} secret material, got {:?}",
                self.chain_id,
                self.family,
                secret.family()
            )));
        }
        let chain_id = self.chain_id;
        self.submit("withdraw", |state, now, tx| {
            let escrow = state
                .escrows
                .get_mut(id)
                .ok_or_else(|| SwapError::EscrowNotFound(format!("{} on chain {}", id, chain_id)))?;
            let payouts = escrow.withdraw(signer, &secret.to_secret(), now)?;
            for payout in &payouts {
                state.credit(payout);
            }
            state.withdrawals.insert(
                *id,
                WithdrawalEvent { id: *id, caller: signer.clone(), secret, tx: tx.clone(), timestamp: now },
            );
            info!("[ChainSim {}] Escrow {} withdrawn by {}", chain_id, id, signer);
            Ok(())
        })
    }

    async fn cancel(&self, signer: &AccountId, id: &EscrowId) -> Result<TransactionId> {
        let chain_id = self.chain_id;
        self.submit("cancel", |state, now, _| {
            let escrow = state
                .escrows
                .get_mut(id)
                .ok_or_else(|| SwapError::EscrowNotFound(format!("{} on chain {}", id, chain_id)))?;
            let payouts = escrow.cancel(signer, now)?;
            for payout in &payouts {
                state.credit(payout);
            }
            info!("[ChainSim {}] Escrow {} cancelled by {}", chain_id, id, signer);
            Ok(())
        })
    }

    async fn wait_for_confirmation(&self, tx: &TransactionId) -> Result<Confirmation> {
        let state = self.state();
        let receipt = state
            .receipts
            .get(tx)
            .ok_or_else(|| SwapError::ChainCallFailed(format!("chain {}: unknown transaction {}", self.chain_id, tx)))?;
        Ok(match &receipt.revert_reason {
            Some(reason) => Confirmation::Failed(reason.clone()),
            None => Confirmation::Confirmed { block_number: receipt.block_number, timestamp: receipt.timestamp },
        })
    }

    async fn get_deployment_event(&self, tx: &TransactionId) -> Result<DeploymentEvent> {
        self.state()
            .deployments
            .get(tx)
            .cloned()
            .ok_or_else(|| SwapError::EscrowNotFound(format!("no deployment in {} on chain {}", tx, self.chain_id)))
    }

    async fn get_withdrawal_event(&self, id: &EscrowId) -> Result<Option<WithdrawalEvent>> {
        Ok(self.state().withdrawals.get(id).cloned())
    }

    async fn escrow_state(&self, id: &EscrowId) -> Result<Option<EscrowSnapshot>> {
        Ok(self.escrow(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htlc::{HashLock, Secret, TimeLockConfig, TimeLocks};
    use crate::onchain::interface::EscrowStatus;
    use ethers::types::H256;

    const START: u64 = 1_700_000_000;

    fn cairo_chain() -> ChainSimulator {
        ChainSimulator::new(1337, ChainFamily::Cairo, SimClock::new(START))
    }

    fn resolver() -> AccountId {
        AccountId::new(1337, "0x0517ececd29116499f4a1b64b094da79ba08dfd54a3edaa316134c41f8160973")
    }

    fn maker() -> AccountId {
        AccountId::new(1337, "0x0260a8311b4f1092db620b923e8d7d20e76dedcc")
    }

    fn token() -> AssetId {
        AssetId::new(1337, "TKN", "0x0123")
    }

    fn dst_params(secret: &Secret, order_hash: H256, anchor: u64) -> EscrowParams {
        EscrowParams {
            side: Side::Destination,
            id: EscrowId::for_family(ChainFamily::Cairo, order_hash),
            order_hash,
            hashlock: HashLock::for_secret(secret),
            depositor: resolver(),
            recipient: maker(),
            asset: token(),
            amount: 500,
            safety_deposit: 7,
            timelocks: TimeLocks::new(TimeLockConfig::default()).unwrap().with_deployed_at(anchor),
            maker_signature: None,
        }
    }

    async fn funded_chain() -> ChainSimulator {
        let chain = cairo_chain();
        chain.mint(&resolver(), &token(), 1_000);
        chain.mint(&resolver(), &chain.native_asset().clone(), 100);
        chain.approve(&resolver(), &token(), 1_000).await.unwrap();
        chain
    }

    #[tokio::test]
    async fn deploy_withdraw_and_publish_secret() {
        let chain = funded_chain().await;
        let secret = Secret::random();
        let params = dst_params(&secret, H256::repeat_byte(0x42), START);
        let id = params.id;

        let tx = chain.deploy_escrow(&resolver(), params).await.unwrap();
        assert!(matches!(chain.wait_for_confirmation(&tx).await.unwrap(), Confirmation::Confirmed { .. }));
        let event = chain.get_deployment_event(&tx).await.unwrap();
        assert_eq!(event.timestamp, START);
        assert_eq!(event.principal, 500);
        assert_eq!(chain.balance(&resolver(), &token()), 500);
        assert_eq!(chain.balance(&resolver(), chain.native_asset()), 93);
        assert!(chain.get_withdrawal_event(&id).await.unwrap().is_none());

        chain.clock().advance_by(3);
        let material = SecretMaterial::for_family(ChainFamily::Cairo, &secret);
        chain.withdraw(&maker(), &id, material.clone()).await.unwrap();

        let published = chain.get_withdrawal_event(&id).await.unwrap().unwrap();
        assert_eq!(published.secret, material);
        assert_eq!(published.secret.to_secret(), secret);
        assert_eq!(chain.balance(&maker(), &token()), 500);
        assert_eq!(chain.balance(&maker(), chain.native_asset()), 7);
        assert_eq!(chain.escrow(&id).unwrap().status, EscrowStatus::Withdrawn);
    }

    #[tokio::test]
    async fn rejects_wrong_secret_encoding() {
        let chain = funded_chain().await;
        let secret = Secret::random();
        let params = dst_params(&secret, H256::repeat_byte(0x42), START);
        let id = params.id;
        chain.deploy_escrow(&resolver(), params).await.unwrap();
        let full = SecretMaterial::for_family(ChainFamily::Evm, &secret);
        assert!(matches!(chain.withdraw(&maker(), &id, full).await, Err(SwapError::SecretEncoding(_))));
    }

    #[tokio::test]
    async fn residue_collision_is_rejected() {
        let chain = funded_chain().await;
        let first = H256::repeat_byte(0xff);
        // A different order hash with the same felt residue.
        let second = felt::reduce(&first);
        assert_ne!(first, second);

        chain.deploy_escrow(&resolver(), dst_params(&Secret::random(), first, START)).await.unwrap();
        let result = chain.deploy_escrow(&resolver(), dst_params(&Secret::random(), second, START)).await;
        assert!(matches!(result, Err(SwapError::EscrowIdCollision(_))));
        assert_eq!(chain.balance(&resolver(), &token()), 500);
    }

    #[tokio::test]
    async fn destination_requires_anchor_and_allowance() {
        let chain = cairo_chain();
        chain.mint(&resolver(), &token(), 1_000);
        chain.mint(&resolver(), &chain.native_asset().clone(), 100);
        let secret = Secret::random();

        let result = chain.deploy_escrow(&resolver(), dst_params(&secret, H256::repeat_byte(1), START)).await;
        assert!(matches!(result, Err(SwapError::InsufficientFunds(_))));

        chain.approve(&resolver(), &token(), 500).await.unwrap();
        chain.approve(&resolver(), &token(), 200).await.unwrap();
        assert_eq!(chain.allowance(&resolver(), &token()).await.unwrap(), 700);
        let mut unanchored = dst_params(&secret, H256::repeat_byte(1), START);
        unanchored.timelocks = TimeLocks::new(TimeLockConfig::default()).unwrap();
        let result = chain.deploy_escrow(&resolver(), unanchored).await;
        assert!(matches!(result, Err(SwapError::CausalOrderingViolation(_))));
        assert_eq!(chain.balance(&resolver(), &token()), 1_000);
    }

    #[tokio::test]
    async fn injected_faults() {
        let chain = funded_chain().await;
        let secret = Secret::random();
        let params = dst_params(&secret, H256::repeat_byte(9), START);
        let id = params.id;

        chain.fail_next_submissions(1);
        let result = chain.deploy_escrow(&resolver(), params.clone()).await;
        assert!(matches!(result, Err(SwapError::ChainCallFailed(_))));
        assert!(chain.escrow(&id).is_none());

        chain.revert_next_transactions(1);
        let tx = chain.deploy_escrow(&resolver(), params.clone()).await.unwrap();
        assert!(matches!(chain.wait_for_confirmation(&tx).await.unwrap(), Confirmation::Failed(_)));
        assert!(chain.escrow(&id).is_none());

        chain.lose_next_responses(1);
        let result = chain.deploy_escrow(&resolver(), params).await;
        assert!(matches!(result, Err(SwapError::ChainCallFailed(_))));
        // Executed despite the lost response.
        assert_eq!(chain.escrow(&id).unwrap().status, EscrowStatus::Created);
    }

    #[tokio::test]
    async fn clock_never_moves_backwards() {
        let chain = cairo_chain();
        chain.wait_until(START + 10).await.unwrap();
        chain.wait_until(START + 5).await.unwrap();
        assert_eq!(chain.now().await.unwrap(), START + 10);
    }
}
