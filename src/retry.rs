//! Bounded polling for outcomes that become available once a concurrent writer is done, e.g. a value cached by whoever
//! won a lock.

use serde::Deserialize;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        factor:  u32,
        max:     Duration,
    },
}

impl Backoff {
    /// Delay before attempt number `attempt + 1`, counting from zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, factor, max } => {
                let mult = factor.max(1).checked_pow(attempt).unwrap_or(u32::MAX);
                initial.checked_mul(mult).unwrap_or(max).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff:      Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, factor: u32, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { initial, factor, max },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    /// Attempts ran out. Carries the last result, if there was an attempt at all.
    NotReady(Option<T>),
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Ready(v) => Some(v),
            PollOutcome::NotReady(_) => None,
        }
    }
}

/// Call `f` until `ready` accepts its result, sleeping between attempts as the policy says. No sleep follows the last
/// attempt.
pub async fn retry_until<T, F, Fut, P>(policy: &RetryPolicy, mut f: F, mut ready: P) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: FnMut(&T) -> bool,
{
    let mut last = None;
    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.backoff.delay(attempt - 1);
            trace!("attempt {} of {}, sleeping {delay:?}", attempt + 1, policy.max_attempts);
            tokio::time::sleep(delay).await;
        }
        let result = f().await;
        if ready(&result) {
            return PollOutcome::Ready(result);
        }
        last = Some(result);
    }
    PollOutcome::NotReady(last)
}

/// [`retry_until`] for lookups where any `Some` will do.
pub async fn retry_until_some<T, F, Fut>(policy: &RetryPolicy, f: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    retry_until(policy, f, Option::is_some).await.ready().flatten()
}
