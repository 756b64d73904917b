// Retry with exponential backoff, used for connecting to backing services

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const MAX_DELAY_SECS: u64 = 30;

/// Run `operation` up to `max_attempts` times, doubling the delay between
/// attempts starting from `initial_delay`.
pub async fn with_retry<F, Fut, T, E>(
    what: &str,
    max_attempts: u32,
    initial_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    let mut delay = initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if attempt >= max_attempts => return Err(error),
            Err(error) => {
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    what, attempt, max_attempts, error, delay
                );
                sleep(delay).await;
                attempt += 1;
                delay = (delay * 2).min(Duration::from_secs(MAX_DELAY_SECS));
            }
        }
    }
}
