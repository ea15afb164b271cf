//! Bounded exponential-backoff retry for projection handler invocations.
//!
//! Only transient failures (store unreachable, connection reset) are retried.
//! Deterministic rejections fail immediately: retrying them against the same
//! state cannot change the answer.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::sleep;

use pkgmg_events::{EventEnvelope, Projection};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Ceiling for the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::from_millis(((delay.as_millis() as f64) * self.multiplier) as u64);
        next.min(self.max_delay)
    }
}

/// Check if an error is transient (should retry) or permanent (should not retry).
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The operation failed in a way retrying cannot fix.
    #[error(transparent)]
    Permanent(E),
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Permanent(e) => e,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Permanent(e) => e,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// The closure receives the 1-based attempt number.
pub async fn retry_on_transient<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + IsTransient + 'static,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_transient() {
                    return Err(RetryError::Permanent(error));
                }

                if attempt >= max_attempts {
                    tracing::error!(
                        attempt,
                        error = %error,
                        "operation failed after all retries"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: error,
                    });
                }

                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying after delay"
                );

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

/// Projection adapter that retries the inner projection on transient errors.
///
/// Sound only because projections are safe to re-invoke with the same event.
#[derive(Debug)]
pub struct RetryingProjection<P> {
    inner: P,
    config: RetryConfig,
}

impl<P> RetryingProjection<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait]
impl<P> Projection for RetryingProjection<P>
where
    P: Projection,
    P::Error: IsTransient,
{
    type Ev = P::Ev;
    type Outcome = P::Outcome;
    type Error = RetryError<P::Error>;

    async fn apply(
        &self,
        envelope: &EventEnvelope<Self::Ev>,
    ) -> Result<Self::Outcome, Self::Error> {
        let inner = &self.inner;
        retry_on_transient(&self.config, |_attempt| inner.apply(envelope)).await
    }
}
