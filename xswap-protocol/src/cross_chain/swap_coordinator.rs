// Drives one or more HTLC swaps between a source and a destination chain.
//
// Each step is a separate chain transaction and a recovery point. Before
// submitting, a step re-polls the chain so that a transaction which landed
// without the coordinator hearing about it is adopted, not sent twice.

use crate::config::SwapConfig;
use crate::data_structures::{AssetId, Side};
use crate::errors::{Result, SwapError};
use crate::htlc::{Deadlines, HashLock, Secret, SecretMaterial, TimeLocks};
use crate::onchain::interface::{
    ChainAdapter, Confirmation, ConfirmedDeployment, EscrowId, EscrowParams, EscrowSnapshot, EscrowStatus,
    TransactionId,
};
use crate::order::{Order, SignedOrder};
use crate::cross_chain::retry::with_retry;
use crate::cross_chain::signer::{ChainSigner, SwapCapabilities};
use crate::cross_chain::types::{AbandonReason, SwapCheckpoint, SwapOutcome, SwapPhase, SwapReport, SwapSession};
use ethers::types::H256;
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Terms of a swap the maker wants to make.
#[derive(Clone, Debug)]
pub struct SwapRequest {
    pub maker_asset: AssetId,
    pub making_amount: u128,
    pub taker_asset: AssetId,
    pub taking_amount: u128,
    /// A fresh random secret is generated when `None`.
    pub secret: Option<Secret>,
}

pub struct OrderCoordinator {
    config: SwapConfig,
    source: Arc<dyn ChainAdapter>,
    destination: Arc<dyn ChainAdapter>,
    caps: SwapCapabilities,
    checkpoint_dir: Option<PathBuf>,
}

impl OrderCoordinator {
    pub fn new(
        config: SwapConfig,
        source: Arc<dyn ChainAdapter>,
        destination: Arc<dyn ChainAdapter>,
        caps: SwapCapabilities,
    ) -> Result<Self> {
        config.validate()?;
        if source.chain_id() != config.src_chain_id || destination.chain_id() != config.dst_chain_id {
            return Err(SwapError::Config(format!(
                "adapters serve chains {} -> {}, config expects {} -> {}",
                source.chain_id(),
                destination.chain_id(),
                config.src_chain_id,
                config.dst_chain_id
            )));
        }
        for (name, signer, chain_id) in [
            ("maker_src", &caps.maker_src, config.src_chain_id),
            ("resolver_src", &caps.resolver_src, config.src_chain_id),
            ("maker_dst", &caps.maker_dst, config.dst_chain_id),
            ("resolver_dst", &caps.resolver_dst, config.dst_chain_id),
        ] {
            if signer.chain_id() != chain_id {
                return Err(SwapError::Config(format!(
                    "{} signer is on chain {}, expected {}",
                    name,
                    signer.chain_id(),
                    chain_id
                )));
            }
        }
        if !caps.maker_src_matches_wallet() {
            return Err(SwapError::Config(format!(
                "maker source account {} is not the order-signing wallet",
                caps.maker_src.account()
            )));
        }
        Ok(OrderCoordinator { config, source, destination, caps, checkpoint_dir: None })
    }

    /// Writes a checkpoint to `<dir>/<order hash>.json` after every step.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    pub fn checkpoint_path(&self, order_hash: H256) -> Option<PathBuf> {
        self.checkpoint_dir.as_ref().map(|dir| dir.join(format!("{:?}.json", order_hash)))
    }

    // --- Steps 1-2: secret, hashlock, order, signature ---

    pub fn prepare(&self, request: SwapRequest) -> Result<SwapSession> {
        let secret = request.secret.unwrap_or_else(Secret::random);
        let hashlock = HashLock::for_secret(&secret);

        let order = Order::builder()
            .maker(self.caps.maker_wallet_address())
            .receiver(self.caps.maker_dst.account().clone())
            .maker_asset(request.maker_asset, request.making_amount)
            .taker_asset(request.taker_asset, request.taking_amount)
            .hashlock(hashlock)
            .timelocks(self.config.time_locks()?)
            .source_chain(self.source.chain_id())
            .destination_chain(self.destination.chain_id())
            .safety_deposits(self.config.src_safety_deposit, self.config.dst_safety_deposit)
            .build()?;
        let signed_order = SignedOrder::sign(order, &self.caps.maker_wallet)?;
        let order_hash = signed_order.order_hash();

        let session = SwapSession {
            phase: SwapPhase::Signed,
            secret,
            src_escrow_id: EscrowId::for_family(self.source.family(), order_hash),
            dst_escrow_id: EscrowId::for_family(self.destination.family(), order_hash),
            signed_order,
            src_deployment: None,
            dst_deployment: None,
            dst_withdraw_tx: None,
            src_withdraw_tx: None,
            abandon_reason: None,
        };
        info!(
            "[Coordinator] Order {:?} signed: hashlock {}, src escrow {}, dst escrow {}",
            order_hash, hashlock, session.src_escrow_id, session.dst_escrow_id
        );
        Ok(session)
    }

    // --- Step 3: source escrow ---

    pub async fn deploy_source(&self, session: &mut SwapSession) -> Result<()> {
        if session.src_deployment.is_some() {
            return Ok(());
        }
        session.signed_order.verify()?;
        let order = session.signed_order.order().clone();
        let params = EscrowParams {
            side: Side::Source,
            id: session.src_escrow_id,
            order_hash: session.order_hash(),
            hashlock: order.hashlock(),
            depositor: self.caps.maker_src.account().clone(),
            recipient: self.caps.resolver_src.account().clone(),
            asset: order.maker_asset().clone(),
            amount: order.making_amount(),
            safety_deposit: order.src_safety_deposit(),
            timelocks: order.timelocks(),
            maker_signature: Some(*session.signed_order.signature()),
        };

        let deployment = match self.find_own_escrow(self.source.as_ref(), &params).await? {
            Some(existing) => existing,
            None => {
                let _funding = self.caps.maker_src.acquire_funding().await;
                self.approve(self.source.as_ref(), &self.caps.maker_src, &params.asset, params.amount).await?;
                self.submit_deployment(self.source.as_ref(), &self.caps.resolver_src, params).await?
            }
        };
        info!(
            "[Coordinator] Source escrow {} confirmed at {} on chain {}",
            deployment.id,
            deployment.timestamp,
            self.source.chain_id()
        );
        session.src_deployment = Some(deployment);
        session.phase = SwapPhase::SourceDeployed;
        Ok(())
    }

    // --- Step 4: destination timelocks, only from a confirmed source deployment ---

    /// Destination timelocks anchored at the confirmed source deployment
    /// timestamp plus the cross-chain setup delay.
    pub fn destination_timelocks(&self, session: &SwapSession) -> Result<TimeLocks> {
        let src = session.src_deployment.as_ref().ok_or_else(|| {
            SwapError::CausalOrderingViolation(format!(
                "destination deadlines of {:?} requested before the source escrow is confirmed",
                session.order_hash()
            ))
        })?;
        let anchor = src.timestamp.saturating_add(self.config.cross_chain_setup_delay_secs);
        Ok(session.signed_order.order().timelocks().with_deployed_at(anchor))
    }

    pub fn destination_deadlines(&self, session: &SwapSession) -> Result<Deadlines> {
        self.destination_timelocks(session)?.deadlines(Side::Destination)
    }

    // --- Step 5: destination escrow ---

    pub async fn deploy_destination(&self, session: &mut SwapSession) -> Result<()> {
        if session.dst_deployment.is_some() {
            return Ok(());
        }
        let timelocks = self.destination_timelocks(session)?;
        let order = session.signed_order.order().clone();

        // The resolver only locks funds against a source escrow holding the agreed terms.
        let src = self.poll_escrow(self.source.as_ref(), session.src_escrow_id).await?;
        match src {
            Some(s) if s.status == EscrowStatus::Created
                && s.hashlock == order.hashlock()
                && s.amount == order.making_amount() => {}
            _ => {
                return Err(SwapError::InvalidOrder(format!(
                    "source escrow {} does not hold the order terms",
                    session.src_escrow_id
                )))
            }
        }

        let params = EscrowParams {
            side: Side::Destination,
            id: session.dst_escrow_id,
            order_hash: session.order_hash(),
            hashlock: order.hashlock(),
            depositor: self.caps.resolver_dst.account().clone(),
            recipient: order.receiver().clone(),
            asset: order.taker_asset().clone(),
            amount: order.taking_amount(),
            safety_deposit: order.dst_safety_deposit(),
            timelocks,
            maker_signature: None,
        };

        let deployment = match self.find_own_escrow(self.destination.as_ref(), &params).await? {
            Some(existing) => existing,
            None => {
                if let Some(anchor) = timelocks.deployed_at() {
                    self.destination.wait_until(anchor).await?;
                }
                let _funding = self.caps.resolver_dst.acquire_funding().await;
                // Too late for the maker to withdraw: do not lock anything.
                let cancellation = timelocks.deadlines(Side::Destination)?.cancellation;
                let now = self.destination.now().await?;
                if now >= cancellation {
                    warn!(
                        "[Coordinator] Destination window of {:?} closed at {}, chain is at {}",
                        session.order_hash(),
                        cancellation,
                        now
                    );
                    return Err(SwapError::WithdrawalExpired);
                }
                self.approve(self.destination.as_ref(), &self.caps.resolver_dst, &params.asset, params.amount)
                    .await?;
                self.submit_deployment(self.destination.as_ref(), &self.caps.resolver_dst, params).await?
            }
        };
        info!(
            "[Coordinator] Destination escrow {} confirmed on chain {}, anchored at {}",
            deployment.id,
            self.destination.chain_id(),
            deployment.timestamp
        );
        session.dst_deployment = Some(deployment);
        session.phase = SwapPhase::DestinationDeployed;
        Ok(())
    }

    // --- Step 6: maker reveals the secret by withdrawing on the destination ---

    pub async fn reveal_secret(&self, session: &mut SwapSession) -> Result<()> {
        if session.dst_withdraw_tx.is_some() {
            return Ok(());
        }
        let dst = session.dst_deployment.clone().ok_or_else(|| {
            SwapError::CausalOrderingViolation("secret revealed before the destination escrow exists".to_string())
        })?;
        let order = session.signed_order.order().clone();

        // Nothing is revealed unless the destination escrow pays what the order promised.
        match self.poll_escrow(self.destination.as_ref(), dst.id).await? {
            Some(s) if s.status == EscrowStatus::Withdrawn => {}
            Some(s) if s.status == EscrowStatus::Created
                && s.hashlock == order.hashlock()
                && s.amount == order.taking_amount() => {}
            Some(s) if s.status == EscrowStatus::Cancelled => return Err(SwapError::AlreadyFinalized),
            _ => {
                return Err(SwapError::InvalidOrder(format!(
                    "destination escrow {} does not hold the order terms",
                    dst.id
                )))
            }
        }

        let deadlines = dst.timelocks.deadlines(Side::Destination)?;
        let now = self.destination.now().await?;
        if now >= deadlines.cancellation {
            return Err(SwapError::WithdrawalExpired);
        }

        let material = SecretMaterial::for_family(self.destination.family(), &session.secret);
        let tx = self
            .submit_withdrawal(self.destination.as_ref(), &self.caps.maker_dst, dst.id, material)
            .await?;
        info!("[Coordinator] Maker revealed secret on chain {} in {}", self.destination.chain_id(), tx);
        session.dst_withdraw_tx = Some(tx);
        session.phase = SwapPhase::SecretRevealed;
        Ok(())
    }

    // --- Step 7: extract the published secret, replay it on the source ---

    /// Polls the destination chain for the withdrawal and returns the secret
    /// it published, checked against the hashlock.
    pub async fn observe_revealed_secret(&self, session: &SwapSession) -> Result<Secret> {
        let hashlock = session.signed_order.order().hashlock();
        let id = session.dst_escrow_id;
        let started = tokio::time::Instant::now();
        loop {
            let event =
                with_retry(&self.config.retry, "get_withdrawal_event", || self.destination.get_withdrawal_event(&id))
                    .await?;
            if let Some(event) = event {
                let secret = event.secret.to_secret();
                if !hashlock.verify(&secret) {
                    return Err(SwapError::InvalidSecret);
                }
                debug!("[Coordinator] Observed secret for {} in {} (caller {})", id, event.tx, event.caller);
                return Ok(secret);
            }
            if started.elapsed() >= self.config.confirmation_timeout {
                return Err(SwapError::ChainCallFailed(format!(
                    "no withdrawal of {} observed within {:?}",
                    id, self.config.confirmation_timeout
                )));
            }
            tokio::time::sleep(self.config.confirmation_poll_interval).await;
        }
    }

    pub async fn withdraw_source(&self, session: &mut SwapSession, secret: &Secret) -> Result<()> {
        if session.src_withdraw_tx.is_some() {
            return Ok(());
        }
        let src = session.src_deployment.clone().ok_or_else(|| {
            SwapError::CausalOrderingViolation("source withdrawal before the source escrow exists".to_string())
        })?;
        let material = SecretMaterial::for_family(self.source.family(), secret);
        let tx = self
            .submit_withdrawal(self.source.as_ref(), &self.caps.resolver_src, src.id, material)
            .await?;
        info!("[Coordinator] Resolver withdrew source escrow {} in {}", src.id, tx);
        session.src_withdraw_tx = Some(tx);
        session.phase = SwapPhase::Completed;
        Ok(())
    }

    async fn complete_source_leg(&self, session: &mut SwapSession) -> Result<SwapOutcome> {
        let secret = self.observe_revealed_secret(session).await?;
        self.withdraw_source(session, &secret).await?;
        Ok(SwapOutcome::Completed)
    }

    // --- Cancellation paths ---

    /// Unwinds the swap through the escrows' own `cancel()` transitions:
    /// destination first (the resolver reclaims it), then source (the maker
    /// reclaims it). Waits for each side's cancellation deadline. If the
    /// secret turns out to be revealed already, completes the swap instead.
    pub async fn abandon(&self, session: &mut SwapSession, reason: AbandonReason) -> Result<SwapOutcome> {
        warn!("[Coordinator] Abandoning swap {:?}: {}", session.order_hash(), reason);
        let order_hash = session.order_hash();

        if let Some(dst) = self.poll_escrow(self.destination.as_ref(), session.dst_escrow_id).await? {
            if dst.order_hash == order_hash {
                if dst.status == EscrowStatus::Withdrawn {
                    info!("[Coordinator] Secret for {:?} was already revealed, completing instead", order_hash);
                    session.phase = SwapPhase::SecretRevealed;
                    let outcome = self.complete_source_leg(session).await?;
                    self.persist(session);
                    return Ok(outcome);
                }
                let deadlines = dst.timelocks.deadlines(Side::Destination)?;
                self.cancel_leg(self.destination.as_ref(), &self.caps.resolver_dst, dst.id, deadlines.cancellation)
                    .await?;
            }
        }

        if let Some(src) = self.poll_escrow(self.source.as_ref(), session.src_escrow_id).await? {
            if src.order_hash == order_hash {
                let deadlines = src.timelocks.deadlines(Side::Source)?;
                self.cancel_leg(self.source.as_ref(), &self.caps.maker_src, src.id, deadlines.cancellation).await?;
            }
        }

        session.abandon_reason = Some(reason.clone());
        session.phase = SwapPhase::Abandoned;
        self.persist(session);
        Ok(SwapOutcome::Abandoned(reason))
    }

    async fn abandon_or_fail(&self, session: &mut SwapSession, reason: AbandonReason) -> SwapOutcome {
        match self.abandon(session, reason).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("[Coordinator] Could not unwind swap {:?}: {}", session.order_hash(), err);
                SwapOutcome::Failed(err)
            }
        }
    }

    // --- Orchestration ---

    /// Drives `session` from its recorded phase to a final outcome.
    pub async fn run(&self, session: &mut SwapSession) -> SwapOutcome {
        loop {
            self.persist(session);
            match session.phase {
                SwapPhase::Signed => {
                    if let Err(err) = self.deploy_source(session).await {
                        error!("[Coordinator] Source escrow for {:?} failed: {}", session.order_hash(), err);
                        return SwapOutcome::Failed(err);
                    }
                }
                SwapPhase::SourceDeployed => {
                    match self.deploy_destination(session).await {
                        Ok(()) => {}
                        Err(SwapError::WithdrawalExpired) => {
                            return self.abandon_or_fail(session, AbandonReason::DestinationWindowExpired).await;
                        }
                        Err(err) => {
                            let reason = AbandonReason::DestinationDeploymentFailed(err.to_string());
                            return self.abandon_or_fail(session, reason).await;
                        }
                    }
                }
                SwapPhase::DestinationDeployed => {
                    if let Some(dst) = &session.dst_deployment {
                        let reveal_at = dst.timestamp.saturating_add(self.config.maker_reveal_delay_secs);
                        if let Err(err) = self.destination.wait_until(reveal_at).await {
                            return SwapOutcome::Failed(err);
                        }
                    }
                    match self.reveal_secret(session).await {
                        Ok(()) => {}
                        Err(SwapError::WithdrawalExpired) => {
                            return self.abandon_or_fail(session, AbandonReason::DestinationWindowExpired).await;
                        }
                        Err(err) => {
                            let reason = AbandonReason::RevealRejected(err.to_string());
                            return self.abandon_or_fail(session, reason).await;
                        }
                    }
                }
                SwapPhase::SecretRevealed => {
                    if let Err(err) = self.complete_source_leg(session).await {
                        error!(
                            "[Coordinator] Secret of {:?} is public but the source withdrawal failed: {}",
                            session.order_hash(),
                            err
                        );
                        return SwapOutcome::Failed(err);
                    }
                }
                SwapPhase::Completed => {
                    info!("[Coordinator] Swap {:?} completed", session.order_hash());
                    return SwapOutcome::Completed;
                }
                SwapPhase::Abandoned => {
                    let reason = session.abandon_reason.clone().unwrap_or(AbandonReason::DestinationWindowExpired);
                    return SwapOutcome::Abandoned(reason);
                }
            }
        }
    }

    pub async fn execute_swap(&self, request: SwapRequest) -> SwapReport {
        let mut session = match self.prepare(request) {
            Ok(session) => session,
            Err(err) => return SwapReport { outcome: SwapOutcome::Failed(err), session: None },
        };
        let outcome = self.run(&mut session).await;
        SwapReport { outcome, session: Some(session) }
    }

    /// Runs independent swaps concurrently. Each has its own order, secret
    /// and escrow pair; they only share the per-account transaction locks.
    pub async fn execute_batch(&self, requests: Vec<SwapRequest>) -> Vec<SwapReport> {
        info!("[Coordinator] Starting batch of {} swaps", requests.len());
        join_all(requests.into_iter().map(|request| self.execute_swap(request))).await
    }

    /// Continues a swap from a checkpoint. The recorded phase is only a hint:
    /// every step re-reads chain state before submitting anything.
    pub async fn resume(&self, checkpoint: SwapCheckpoint) -> SwapReport {
        let mut session = checkpoint.session;
        if session.signed_order.order().maker() != self.caps.maker_wallet_address() {
            let err = SwapError::Checkpoint("checkpoint belongs to a different maker".to_string());
            return SwapReport { outcome: SwapOutcome::Failed(err), session: Some(session) };
        }
        info!(
            "[Coordinator] Resuming {:?} from {:?} (saved {})",
            session.order_hash(),
            session.phase,
            checkpoint.saved_at
        );
        let outcome = self.run(&mut session).await;
        SwapReport { outcome, session: Some(session) }
    }

    // --- Chain call helpers ---

    fn persist(&self, session: &SwapSession) {
        if let Some(path) = self.checkpoint_path(session.order_hash()) {
            if let Err(err) = session.checkpoint().save(&path) {
                warn!("[Coordinator] Could not write checkpoint {}: {}", path.display(), err);
            }
        }
    }

    async fn poll_escrow(&self, chain: &dyn ChainAdapter, id: EscrowId) -> Result<Option<EscrowSnapshot>> {
        with_retry(&self.config.retry, "escrow_state", || chain.escrow_state(&id)).await
    }

    /// An escrow already at `params.id` is adopted if it was created for the
    /// same order. Anything else there is an identifier collision.
    async fn find_own_escrow(&self, chain: &dyn ChainAdapter, params: &EscrowParams) -> Result<Option<ConfirmedDeployment>> {
        let snapshot = match self.poll_escrow(chain, params.id).await? {
            Some(snapshot) => snapshot,
            None => return Ok(None),
        };
        if snapshot.order_hash != params.order_hash {
            return Err(SwapError::EscrowIdCollision(format!(
                "{} escrow {} on chain {} belongs to order {:?}",
                params.side,
                params.id,
                chain.chain_id(),
                snapshot.order_hash
            )));
        }
        let timestamp = snapshot.timelocks.deployed_at().ok_or_else(|| {
            SwapError::CausalOrderingViolation(format!("escrow {} has no deployment timestamp", params.id))
        })?;
        debug!("[Coordinator] Adopting existing {} escrow {}", params.side, params.id);
        Ok(Some(ConfirmedDeployment { id: params.id, tx: None, timestamp, timelocks: snapshot.timelocks }))
    }

    async fn confirm(&self, chain: &dyn ChainAdapter, tx: &TransactionId) -> Result<u64> {
        let timeout = self.config.confirmation_timeout;
        let confirmation = tokio::time::timeout(timeout, chain.wait_for_confirmation(tx))
            .await
            .map_err(|_| SwapError::ChainCallFailed(format!("{} not confirmed within {:?}", tx, timeout)))??;
        match confirmation {
            Confirmation::Confirmed { block_number, timestamp } => {
                debug!("[Coordinator] {} confirmed in block {} on chain {}", tx, block_number, chain.chain_id());
                Ok(timestamp)
            }
            Confirmation::Failed(reason) => Err(SwapError::ChainCallFailed(format!("{} failed: {}", tx, reason))),
        }
    }

    /// Tops the factory allowance up to `amount`. An approval that landed
    /// unseen is found by re-reading the allowance, never granted twice.
    /// Callers hold the owner's funding lock.
    async fn approve(&self, chain: &dyn ChainAdapter, owner: &ChainSigner, asset: &AssetId, amount: u128) -> Result<()> {
        with_retry(&self.config.retry, "approve", || async move {
            let _in_flight = owner.acquire().await;
            let granted = chain.allowance(owner.account(), asset).await?;
            if granted >= amount {
                debug!(
                    "[Coordinator] {} already allows {} {} on chain {}",
                    owner.account(),
                    granted,
                    asset.token_symbol,
                    chain.chain_id()
                );
                return Ok(());
            }
            let tx = chain.approve(owner.account(), asset, amount - granted).await?;
            self.confirm(chain, &tx).await.map(|_| ())
        })
        .await
    }

    async fn submit_deployment(
        &self,
        chain: &dyn ChainAdapter,
        signer: &ChainSigner,
        params: EscrowParams,
    ) -> Result<ConfirmedDeployment> {
        let op_name = format!("deploy {} escrow", params.side);
        with_retry(&self.config.retry, &op_name, || {
            let params = params.clone();
            async move {
                if let Some(existing) = self.find_own_escrow(chain, &params).await? {
                    return Ok(existing);
                }
                let _in_flight = signer.acquire().await;
                let tx = chain.deploy_escrow(signer.account(), params).await?;
                self.confirm(chain, &tx).await?;
                let event = chain.get_deployment_event(&tx).await?;
                Ok(ConfirmedDeployment { id: event.id, tx: Some(tx), timestamp: event.timestamp, timelocks: event.timelocks })
            }
        })
        .await
    }

    async fn submit_withdrawal(
        &self,
        chain: &dyn ChainAdapter,
        signer: &ChainSigner,
        id: EscrowId,
        material: SecretMaterial,
    ) -> Result<TransactionId> {
        with_retry(&self.config.retry, "withdraw", || {
            let material = material.clone();
            async move {
                match chain.escrow_state(&id).await? {
                    None => return Err(SwapError::EscrowNotFound(format!("{} on chain {}", id, chain.chain_id()))),
                    Some(s) if s.status == EscrowStatus::Cancelled => return Err(SwapError::AlreadyFinalized),
                    Some(s) if s.status == EscrowStatus::Withdrawn => {
                        // Landed earlier; recover the transaction reference.
                        return match chain.get_withdrawal_event(&id).await? {
                            Some(event) => Ok(event.tx),
                            None => Err(SwapError::ChainCallFailed(format!("withdrawal of {} not yet indexed", id))),
                        };
                    }
                    Some(_) => {}
                }
                let _in_flight = signer.acquire().await;
                let tx = chain.withdraw(signer.account(), &id, material).await?;
                self.confirm(chain, &tx).await?;
                Ok(tx)
            }
        })
        .await
    }

    async fn cancel_leg(&self, chain: &dyn ChainAdapter, signer: &ChainSigner, id: EscrowId, cancellation: u64) -> Result<()> {
        chain.wait_until(cancellation).await?;
        with_retry(&self.config.retry, "cancel", || async move {
            match chain.escrow_state(&id).await? {
                None => return Err(SwapError::EscrowNotFound(format!("{} on chain {}", id, chain.chain_id()))),
                Some(s) if s.status == EscrowStatus::Cancelled => return Ok(()),
                Some(s) if s.status == EscrowStatus::Withdrawn => return Err(SwapError::AlreadyFinalized),
                Some(_) => {}
            }
            let _in_flight = signer.acquire().await;
            let tx = chain.cancel(signer.account(), &id).await?;
            self.confirm(chain, &tx).await?;
            info!("[Coordinator] Escrow {} cancelled on chain {} by {}", id, chain.chain_id(), signer.account());
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_config, SimulatedEnvironment, GENESIS_TIMESTAMP};

    #[tokio::test]
    async fn destination_deadlines_need_confirmed_source() {
        let env = SimulatedEnvironment::new(test_config()).unwrap();
        let coordinator = env.coordinator().unwrap();
        let mut session = coordinator.prepare(env.request(1_000, 1_000)).unwrap();

        assert!(matches!(
            coordinator.destination_deadlines(&session),
            Err(SwapError::CausalOrderingViolation(_))
        ));
        assert!(matches!(
            coordinator.deploy_destination(&mut session).await,
            Err(SwapError::CausalOrderingViolation(_))
        ));
        assert!(env.destination.escrow(&session.dst_escrow_id).is_none());

        coordinator.deploy_source(&mut session).await.unwrap();
        let deadlines = coordinator.destination_deadlines(&session).unwrap();
        let anchor = GENESIS_TIMESTAMP + 5;
        assert_eq!(deadlines.withdrawal, anchor + 10);
        assert_eq!(deadlines.public_withdrawal, anchor + 100);
        assert_eq!(deadlines.cancellation, anchor + 101);
        assert_eq!(deadlines.public_cancellation, None);
    }

    #[tokio::test]
    async fn reveal_before_destination_is_rejected() {
        let env = SimulatedEnvironment::new(test_config()).unwrap();
        let coordinator = env.coordinator().unwrap();
        let mut session = coordinator.prepare(env.request(1_000, 1_000)).unwrap();
        coordinator.deploy_source(&mut session).await.unwrap();
        assert!(matches!(
            coordinator.reveal_secret(&mut session).await,
            Err(SwapError::CausalOrderingViolation(_))
        ));
    }

    #[tokio::test]
    async fn escrow_ids_follow_chain_family() {
        let env = SimulatedEnvironment::new(test_config()).unwrap();
        let coordinator = env.coordinator().unwrap();
        let session = coordinator.prepare(env.request(1, 1)).unwrap();
        assert_eq!(session.src_escrow_id.0, session.order_hash());
        assert_eq!(session.dst_escrow_id.0, crate::htlc::felt::reduce(&session.order_hash()));
        assert_eq!(session.signed_order.order().receiver(), &env.maker_dst);
        assert!(session.signed_order.verify().is_ok());
    }

    #[test]
    fn rejects_mismatched_capabilities() {
        let env = SimulatedEnvironment::new(test_config()).unwrap();
        let mut caps = env.capabilities();
        caps.maker_src = caps.resolver_src.clone();
        let result = OrderCoordinator::new(env.config.clone(), env.source.clone(), env.destination.clone(), caps);
        assert!(matches!(result, Err(SwapError::Config(_))));

        let mut caps = env.capabilities();
        caps.resolver_dst = caps.resolver_src.clone();
        let result = OrderCoordinator::new(env.config.clone(), env.source.clone(), env.destination.clone(), caps);
        assert!(matches!(result, Err(SwapError::Config(_))));
    }
}
