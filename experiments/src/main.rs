use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use xswap_protocol::{
    config::SwapConfig,
    cross_chain::{SwapOutcome, SwapReport},
    test_utils::{SimulatedEnvironment, GENESIS_TIMESTAMP, INITIAL_TOKEN_BALANCE},
};

const BATCH_SIZES: [u128; 3] = [1, 5, 20];

#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match SwapConfig::from_json_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => SwapConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!(
        "Swapping chain {} (EVM) -> chain {} (Cairo), timelocks {:?}",
        config.src_chain_id, config.dst_chain_id, config.timelocks
    );

    for &batch_size in &BATCH_SIZES {
        let env = match SimulatedEnvironment::new(config.clone()) {
            Ok(env) => env,
            Err(e) => {
                eprintln!("Could not build simulated chains: {}", e);
                std::process::exit(1);
            }
        };
        let coordinator = match env.coordinator() {
            Ok(coordinator) => coordinator,
            Err(e) => {
                eprintln!("Could not build coordinator: {}", e);
                std::process::exit(1);
            }
        };

        let requests = (1..=batch_size).map(|i| env.request(i * 1_000, i * 990)).collect();
        let started = Instant::now();
        let reports = coordinator.execute_batch(requests).await;
        let elapsed = started.elapsed();

        println!("Batch of {} swaps:", batch_size);
        print_summary(&reports, elapsed);
        println!(
            "  Simulated chain time: {}s, maker gained {} on destination",
            env.clock.now() - GENESIS_TIMESTAMP,
            env.dst_balance(&env.maker_dst) - INITIAL_TOKEN_BALANCE
        );
        println!();
    }
}

fn print_summary(reports: &[SwapReport], elapsed: Duration) {
    let completed = reports.iter().filter(|r| r.is_completed()).count();
    let abandoned = reports.iter().filter(|r| matches!(r.outcome, SwapOutcome::Abandoned(_))).count();
    let failed = reports.len() - completed - abandoned;
    println!("  Completed: {}, Abandoned: {}, Failed: {}", completed, abandoned, failed);
    println!("  Wall time: {:?}", elapsed);
    if !elapsed.is_zero() {
        println!("  Throughput: {:.2} swaps/sec", completed as f64 / elapsed.as_secs_f64());
    }
    for report in reports {
        if let SwapOutcome::Failed(err) = &report.outcome {
            println!("  Failure: {}", err);
        }
    }
}
