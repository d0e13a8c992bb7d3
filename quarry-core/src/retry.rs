//! Retry - Bounded retries for eventually consistent remote APIs
//!
//! A remote call runs in two phases:
//!
//! 1. `RetryPhase::Bounded`: the call is repeated with exponential backoff
//!    while the classifier says the error is transient, until it succeeds,
//!    fails with a fatal error, or the time budget runs out.
//! 2. `RetryPhase::FinalAttempt`: if the budget ran out, the call is made
//!    exactly once more and its result is returned as is.
//!
//! The second phase covers consistency windows that last slightly longer than
//! the budget (e.g. IAM permissions propagating after a role is created).

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{Instant, sleep};

/// First wait between attempts
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for a single wait
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Time allowed past the retry budget for the final attempt and whatever
/// the operation does after it
pub const FINAL_ATTEMPT_GRACE: Duration = Duration::from_secs(60);

/// Outer bound of an operation whose retry phase runs for `retry_budget`.
///
/// Without a retry phase the operator `timeout` is the bound. Otherwise the
/// bound covers the longer of the two plus `FINAL_ATTEMPT_GRACE`, so the
/// final attempt is never cut off by the timer that ended the retry phase.
pub fn outer_bound(timeout: Duration, retry_budget: Option<Duration>) -> Duration {
    match retry_budget {
        Some(budget) => timeout.max(budget).saturating_add(FINAL_ATTEMPT_GRACE),
        None => timeout,
    }
}

/// How an error from the remote call should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; try again while the budget lasts
    Retryable,
    /// Stop and surface the error
    Fatal,
}

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_DELAY,
            max: DEFAULT_MAX_DELAY,
            multiplier: 2,
        }
    }
}

impl Backoff {
    /// Wait before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Upper bound on attempts the schedule makes inside `budget`,
    /// assuming each attempt returns instantly.
    pub fn max_attempts_within(&self, budget: Duration) -> u32 {
        let mut attempts = 1;
        let mut elapsed = Duration::ZERO;
        let mut retry = 0;
        loop {
            let delay = self.delay(retry);
            if delay.is_zero() {
                return u32::MAX;
            }
            elapsed += delay;
            if elapsed >= budget {
                return attempts;
            }
            attempts += 1;
            retry += 1;
        }
    }
}

/// Phase of a retried call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Bounded,
    FinalAttempt,
}

/// Why the bounded phase stopped without a success
#[derive(Debug, PartialEq, Eq)]
pub enum BoundedError<E> {
    /// The classifier marked the error fatal
    Fatal(E),
    /// The budget ran out; `last` is the final transient error
    TimedOut { last: E, attempts: u32 },
}

/// Runs a remote call through the two retry phases
#[derive(Debug, Clone, Copy)]
pub struct Retrier {
    timeout: Duration,
    backoff: Backoff,
}

impl Retrier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run both phases and return the outcome.
    ///
    /// Fatal errors from the bounded phase are returned unmodified; if the
    /// budget runs out the result of the final attempt is returned.
    pub async fn run<T, E, F, Fut, C>(&self, mut op: F, classify: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
    {
        let mut phase = RetryPhase::Bounded;
        loop {
            match phase {
                RetryPhase::Bounded => match self.run_bounded(&mut op, &classify).await {
                    Ok(value) => return Ok(value),
                    Err(BoundedError::Fatal(err)) => return Err(err),
                    Err(BoundedError::TimedOut { attempts, .. }) => {
                        warn!(
                            "retry budget of {:?} exhausted after {} attempt(s), making one final attempt",
                            self.timeout, attempts
                        );
                        phase = RetryPhase::FinalAttempt;
                    }
                },
                RetryPhase::FinalAttempt => return Self::final_attempt(&mut op).await,
            }
        }
    }

    /// Bounded phase: retry transient errors until success, a fatal error,
    /// or the budget runs out. No attempt starts at or after the deadline.
    pub async fn run_bounded<T, E, F, Fut, C>(
        &self,
        op: &mut F,
        classify: &C,
    ) -> Result<T, BoundedError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> ErrorClass,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if classify(&err) == ErrorClass::Fatal {
                debug!("attempt {} failed with a fatal error", attempts);
                return Err(BoundedError::Fatal(err));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BoundedError::TimedOut {
                    last: err,
                    attempts,
                });
            }

            let delay = self.backoff.delay(attempts - 1).min(deadline - now);
            debug!(
                "attempt {} failed with a retryable error, retrying in {:?}",
                attempts, delay
            );
            sleep(delay).await;

            if Instant::now() >= deadline {
                return Err(BoundedError::TimedOut {
                    last: err,
                    attempts,
                });
            }
        }
    }

    /// Final phase: one unconditional attempt
    pub async fn final_attempt<T, E, F, Fut>(op: &mut F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        op().await
    }
}
