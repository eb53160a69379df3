//! Exponential backoff around chain calls.

use crate::config::RetryConfig;
use crate::errors::Result;
use log::{debug, warn};
use std::future::Future;

/// Runs `op` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` attempts are used up. Only
/// `SwapError::ChainCallFailed` is retried; the last error is returned.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("[Retry] {} succeeded after {} retries", op_name, attempt);
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts => {
                let backoff = config.backoff_for_attempt(attempt);
                warn!(
                    "[Retry] {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    op_name,
                    attempt + 1,
                    config.max_attempts,
                    err,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!("[Retry] {} gave up after {} attempts: {}", op_name, attempt + 1, err);
                }
                return Err(err);
            }
        }
    }
}
