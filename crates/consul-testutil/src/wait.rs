//! Bounded retry loop used to wait for an agent to become ready.

use std::future::Future;
use std::time::Duration;

/// How long to keep retrying a readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Total number of calls to the check, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Sleep between a failed attempt and the next one.
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1000,
            interval: Duration::from_millis(10),
        }
    }
}

impl WaitPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// The attempt budget ran out without a successful check.
#[derive(Debug)]
pub struct GaveUp<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Call `check` until it returns `Ok(())` or the policy's attempt budget is spent.
///
/// Every `Err` is treated as "not ready yet". There is no sleep after the final attempt.
///
/// # Errors
///
/// Returns [`GaveUp`] carrying the error from the last attempt once the budget is exhausted.
pub async fn retry_until_ok<F, Fut, E>(policy: WaitPolicy, mut check: F) -> Result<(), GaveUp<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match check().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => {
                return Err(GaveUp {
                    attempts,
                    last_error: e,
                });
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "not ready yet");
                attempt += 1;
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

/// Handler-style wrapper around [`retry_until_ok`].
///
/// Returns `true` on success. On exhaustion calls `on_give_up` exactly once with the last error
/// and returns `false`.
pub async fn wait_for_result<F, Fut, E, G>(policy: WaitPolicy, check: F, on_give_up: G) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
    G: FnOnce(E),
{
    match retry_until_ok(policy, check).await {
        Ok(()) => true,
        Err(gave_up) => {
            on_give_up(gave_up.last_error);
            false
        }
    }
}
