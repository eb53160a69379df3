// Independent swaps running at the same time against shared chains and accounts.

use futures::future::join_all;
use std::collections::HashSet;
use xswap_protocol::{
    cross_chain::SwapOutcome,
    onchain::{ChainAdapter, EscrowStatus},
    test_utils::{test_config, SimulatedEnvironment, INITIAL_TOKEN_BALANCE},
};

#[tokio::test]
async fn test_batch_of_swaps_is_isolated() {
    let env = SimulatedEnvironment::new(test_config()).unwrap();
    let coordinator = env.coordinator().unwrap();

    let amounts: Vec<u128> = (1..=5).map(|i| i * 100).collect();
    let requests = amounts.iter().map(|amount| env.request(*amount, *amount * 3)).collect();
    let reports = coordinator.execute_batch(requests).await;

    assert_eq!(reports.len(), amounts.len());
    let mut src_ids = HashSet::new();
    let mut dst_ids = HashSet::new();
    for report in &reports {
        assert_eq!(report.outcome, SwapOutcome::Completed);
        let session = report.session.as_ref().unwrap();
        assert!(src_ids.insert(session.src_escrow_id));
        assert!(dst_ids.insert(session.dst_escrow_id));
        assert_eq!(env.source.escrow(&session.src_escrow_id).unwrap().status, EscrowStatus::Withdrawn);
        assert_eq!(env.destination.escrow(&session.dst_escrow_id).unwrap().status, EscrowStatus::Withdrawn);
    }

    let total: u128 = amounts.iter().sum();
    assert_eq!(env.src_balance(&env.maker_src), INITIAL_TOKEN_BALANCE - total);
    assert_eq!(env.src_balance(&env.resolver_src), INITIAL_TOKEN_BALANCE + total);
    assert_eq!(env.dst_balance(&env.maker_dst), INITIAL_TOKEN_BALANCE + 3 * total);
    assert_eq!(env.dst_balance(&env.resolver_dst), INITIAL_TOKEN_BALANCE - 3 * total);

    // Every approval was spent by the escrow it was made for.
    assert_eq!(env.source.allowance(&env.maker_src, &env.src_token).await.unwrap(), 0);
    assert_eq!(env.destination.allowance(&env.resolver_dst, &env.dst_token).await.unwrap(), 0);
}

#[tokio::test]
async fn test_separate_coordinators_share_account_locks() {
    let env = SimulatedEnvironment::new(test_config()).unwrap();
    let first = env.coordinator().unwrap();
    let second = env.coordinator().unwrap();

    let reports = join_all(vec![
        first.execute_swap(env.request(10, 20)),
        second.execute_swap(env.request(30, 40)),
        first.execute_swap(env.request(50, 60)),
    ])
    .await;

    assert!(reports.iter().all(|r| r.is_completed()));
    assert_eq!(env.src_balance(&env.resolver_src), INITIAL_TOKEN_BALANCE + 90);
    assert_eq!(env.dst_balance(&env.maker_dst), INITIAL_TOKEN_BALANCE + 120);
}
