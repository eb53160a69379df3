// Swaps that end through the timelock-gated cancel() paths.

use ethers::types::{H256, U256};
use xswap_protocol::{
    cross_chain::{AbandonReason, SwapOutcome, SwapPhase},
    data_structures::{ChainFamily, Side},
    htlc::{felt, HashLock, Secret},
    onchain::{ChainAdapter, EscrowId, EscrowParams, EscrowStatus},
    test_utils::{test_config, SimulatedEnvironment, GENESIS_TIMESTAMP, INITIAL_NATIVE_BALANCE, INITIAL_TOKEN_BALANCE},
    SwapError,
};

const AMOUNT: u128 = 5_000;

#[tokio::test]
async fn test_abandoned_when_maker_misses_destination_window() {
    let mut config = test_config();
    config.maker_reveal_delay_secs = 200;
    let env = SimulatedEnvironment::new(config).unwrap();
    let coordinator = env.coordinator().unwrap();

    let report = coordinator.execute_swap(env.request(AMOUNT, AMOUNT)).await;
    assert_eq!(report.outcome, SwapOutcome::Abandoned(AbandonReason::DestinationWindowExpired));
    let session = report.session.unwrap();
    assert_eq!(session.phase, SwapPhase::Abandoned);
    assert!(session.dst_withdraw_tx.is_none());

    assert_eq!(env.source.escrow(&session.src_escrow_id).unwrap().status, EscrowStatus::Cancelled);
    assert_eq!(env.destination.escrow(&session.dst_escrow_id).unwrap().status, EscrowStatus::Cancelled);

    // Principal back with each depositor; deposits with whoever cancelled.
    assert_eq!(env.src_balance(&env.maker_src), INITIAL_TOKEN_BALANCE);
    assert_eq!(env.dst_balance(&env.resolver_dst), INITIAL_TOKEN_BALANCE);
    assert_eq!(env.dst_native(&env.resolver_dst), INITIAL_NATIVE_BALANCE);
    assert_eq!(env.src_native(&env.maker_src), INITIAL_NATIVE_BALANCE + env.config.src_safety_deposit);
    assert_eq!(env.dst_balance(&env.maker_dst), INITIAL_TOKEN_BALANCE);

    // Cancelling waited for the source deadline.
    assert!(env.clock.now() >= GENESIS_TIMESTAMP + env.config.timelocks.src_cancellation);
}

#[tokio::test]
async fn test_abandoned_when_destination_cannot_be_funded() {
    let env = SimulatedEnvironment::new(test_config()).unwrap();
    let coordinator = env.coordinator().unwrap();

    let report = coordinator.execute_swap(env.request(AMOUNT, INITIAL_TOKEN_BALANCE + 1)).await;
    match &report.outcome {
        SwapOutcome::Abandoned(AbandonReason::DestinationDeploymentFailed(reason)) => {
            assert!(reason.contains("Insufficient funds"), "unexpected reason: {}", reason)
        }
        other => panic!("expected abandonment, got {:?}", other),
    }
    let session = report.session.unwrap();
    assert!(session.dst_deployment.is_none());
    assert!(env.destination.escrow(&session.dst_escrow_id).is_none());
    assert_eq!(env.source.escrow(&session.src_escrow_id).unwrap().status, EscrowStatus::Cancelled);
    assert_eq!(env.src_balance(&env.maker_src), INITIAL_TOKEN_BALANCE);
}

#[tokio::test]
async fn test_destination_not_funded_after_its_window_closed() {
    let env = SimulatedEnvironment::new(test_config()).unwrap();
    let coordinator = env.coordinator().unwrap();
    let mut session = coordinator.prepare(env.request(AMOUNT, AMOUNT)).unwrap();
    coordinator.deploy_source(&mut session).await.unwrap();

    // The resolver comes back only once the destination cancellation deadline has passed.
    let deadlines = coordinator.destination_deadlines(&session).unwrap();
    env.clock.advance_to(deadlines.cancellation);
    assert_eq!(coordinator.deploy_destination(&mut session).await, Err(SwapError::WithdrawalExpired));
    assert!(env.destination.escrow(&session.dst_escrow_id).is_none());
    assert_eq!(env.dst_balance(&env.resolver_dst), INITIAL_TOKEN_BALANCE);
    assert_eq!(env.destination.allowance(&env.resolver_dst, &env.dst_token).await.unwrap(), 0);

    let outcome = coordinator.run(&mut session).await;
    assert_eq!(outcome, SwapOutcome::Abandoned(AbandonReason::DestinationWindowExpired));
    assert_eq!(env.source.escrow(&session.src_escrow_id).unwrap().status, EscrowStatus::Cancelled);
    assert_eq!(env.src_balance(&env.maker_src), INITIAL_TOKEN_BALANCE);
}

#[tokio::test]
async fn test_cancel_respects_deadlines_and_finality() {
    let env = SimulatedEnvironment::new(test_config()).unwrap();
    let coordinator = env.coordinator().unwrap();
    let mut session = coordinator.prepare(env.request(AMOUNT, AMOUNT)).unwrap();
    coordinator.deploy_source(&mut session).await.unwrap();
    let id = session.src_escrow_id;
    let t = GENESIS_TIMESTAMP;

    assert_eq!(env.source.cancel(&env.maker_src, &id).await, Err(SwapError::NotYetCancellable));

    env.clock.advance_to(t + env.config.timelocks.src_cancellation);
    let resolver_cancel = env.source.cancel(&env.resolver_src, &id).await;
    assert!(matches!(resolver_cancel, Err(SwapError::Unauthorized(_))));

    env.source.cancel(&env.maker_src, &id).await.unwrap();
    assert_eq!(env.src_balance(&env.maker_src), INITIAL_TOKEN_BALANCE);
    assert_eq!(env.src_native(&env.maker_src), INITIAL_NATIVE_BALANCE + env.config.src_safety_deposit);

    assert_eq!(env.source.cancel(&env.maker_src, &id).await, Err(SwapError::AlreadyFinalized));
}

#[tokio::test]
async fn test_anyone_cancels_source_after_public_cancellation() {
    let env = SimulatedEnvironment::new(test_config()).unwrap();
    let coordinator = env.coordinator().unwrap();
    let mut session = coordinator.prepare(env.request(AMOUNT, AMOUNT)).unwrap();
    coordinator.deploy_source(&mut session).await.unwrap();

    env.clock.advance_to(GENESIS_TIMESTAMP + env.config.timelocks.src_public_cancellation);
    env.source.cancel(&env.resolver_src, &session.src_escrow_id).await.unwrap();
    // Principal still returns to the maker.
    assert_eq!(env.src_balance(&env.maker_src), INITIAL_TOKEN_BALANCE);
    assert_eq!(env.src_native(&env.resolver_src), INITIAL_NATIVE_BALANCE);
}

#[tokio::test]
async fn test_felt_residue_collision_abandons_swap() {
    let env = SimulatedEnvironment::new(test_config()).unwrap();
    let coordinator = env.coordinator().unwrap();
    let mut session = coordinator.prepare(env.request(AMOUNT, AMOUNT)).unwrap();
    coordinator.deploy_source(&mut session).await.unwrap();

    // Another order whose hash shares our destination residue.
    let ours = U256::from_big_endian(session.order_hash().as_bytes());
    let modulus = felt::reduction_modulus();
    let mut candidate = ours % modulus + modulus;
    if candidate == ours {
        candidate = candidate + modulus;
    }
    let mut bytes = [0u8; 32];
    candidate.to_big_endian(&mut bytes);
    let other_hash = H256::from(bytes);
    let other_id = EscrowId::for_family(ChainFamily::Cairo, other_hash);
    assert_eq!(other_id, session.dst_escrow_id);

    let squatter_terms = EscrowParams {
        side: Side::Destination,
        id: other_id,
        order_hash: other_hash,
        hashlock: HashLock::for_secret(&Secret::random()),
        depositor: env.resolver_dst.clone(),
        recipient: env.maker_dst.clone(),
        asset: env.dst_token.clone(),
        amount: 1,
        safety_deposit: 0,
        timelocks: env.config.time_locks().unwrap().with_deployed_at(GENESIS_TIMESTAMP),
        maker_signature: None,
    };
    env.destination.approve(&env.resolver_dst, &env.dst_token, 1).await.unwrap();
    env.destination.deploy_escrow(&env.resolver_dst, squatter_terms).await.unwrap();

    let err = coordinator.deploy_destination(&mut session).await.unwrap_err();
    assert!(matches!(err, SwapError::EscrowIdCollision(_)));

    let outcome = coordinator.run(&mut session).await;
    assert!(matches!(outcome, SwapOutcome::Abandoned(AbandonReason::DestinationDeploymentFailed(_))));
    assert_eq!(env.source.escrow(&session.src_escrow_id).unwrap().status, EscrowStatus::Cancelled);
    // The unrelated escrow is left alone.
    assert_eq!(env.destination.escrow(&other_id).unwrap().status, EscrowStatus::Created);
}
