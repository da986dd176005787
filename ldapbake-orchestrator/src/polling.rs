use anyhow::Result;
use ldapbake_common::BakeError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Fixed-interval polling with an optional cap on re-fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls forever.
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Sleep-then-refetch until `done` holds for the latest observation.
///
/// `initial` counts as the first observation, so a value that is already done
/// returns without sleeping. Each non-done observation costs exactly one sleep
/// and one call to `refetch`. Errors from `refetch` abort the wait unchanged.
pub async fn wait_until<T, F, Fut, P>(
    policy: &PollPolicy,
    what: &str,
    initial: T,
    mut refetch: F,
    done: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let mut current = initial;
    let mut attempts: u32 = 0;

    while !done(&current) {
        if let Some(max) = policy.max_attempts {
            if attempts >= max {
                return Err(BakeError::TimedOut {
                    what: what.to_string(),
                    attempts,
                }
                .into());
            }
        }
        sleep(policy.interval).await;
        attempts += 1;
        debug!("⏳ [poll] {} attempt {}", what, attempts);
        current = refetch().await?;
    }

    Ok(current)
}
