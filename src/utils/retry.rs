// Retry helper for upstream dataset calls
// Policy: bounded attempts with a delay that grows linearly per attempt

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Back-off policy for transient upstream failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Delay before the given retry (1-indexed): base, base*2, base*3, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run an async operation with back-off retries.
///
/// `op` is invoked up to `policy.max_attempts` times; the final error is
/// returned unchanged. The `label` only feeds the logs.
pub async fn with_retry<T, E, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    label,
                    attempt,
                    policy.max_attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            },
            Err(e) => {
                tracing::error!("{} failed after {} attempts: {}", label, attempt, e);
                return Err(e);
            },
        }
    }
}
