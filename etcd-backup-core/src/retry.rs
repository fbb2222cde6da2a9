//! Fixed-delay retry combinator.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Every attempt failed or was rejected by the success predicate.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: usize,
    /// Error of the last failed attempt, if any attempt failed at all.
    pub last_error: Option<E>,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "still failing after {} attempts", self.attempts)?;
        if let Some(e) = &self.last_error {
            write!(f, ": {e}")?;
        }
        Ok(())
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Run `op` until it succeeds with a value `done` accepts, sleeping
/// `policy.delay` between attempts and giving up after `policy.max_attempts`.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut op: F,
    mut done: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T) -> bool,
    E: fmt::Display,
{
    let mut last_error = None;
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) if done(&value) => return Ok(value),
            Ok(_) => debug!(attempt, "Retry condition not met yet"),
            Err(e) => {
                warn!(attempt, max_attempts = policy.max_attempts, error = %e, "Attempt failed");
                last_error = Some(e);
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Err(RetryError {
        attempts: policy.max_attempts,
        last_error,
    })
}
