//! Retry with exponential backoff around external API calls
//!
//! Every call against a rate-limited, eventually-consistent cloud API goes
//! through [`retry_with_backoff`] or [`poll_with_backoff`]. The wrapped
//! operation reports one of three outcomes:
//!
//! - `Ok(true)` / `Ok(Some(_))`: done
//! - `Ok(false)` / `Ok(None)`: not done yet, retry after the next delay
//! - `Err(_)`: abort immediately, except [`Error::Transient`] which is
//!   retried and remembered as the last error
//!
//! Exhausting the policy surfaces [`Error::RetryTimeout`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Backoff policy for provider operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay before the second attempt
    pub initial: Duration,

    /// Multiplier applied to the delay after every attempt
    pub factor: f64,

    /// Random extra delay, as a fraction of the current delay
    pub jitter: f64,

    /// Maximum number of attempts
    pub steps: u32,

    /// Upper bound for a single delay
    pub cap: Option<Duration>,
}

impl Backoff {
    /// Policy for reads: retried many times
    pub fn read() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 1.5,
            jitter: 0.1,
            steps: 10,
            cap: None,
        }
    }

    /// Policy for mutations: fewer attempts, the operation itself must be idempotent
    pub fn write() -> Self {
        Self {
            steps: 5,
            ..Self::read()
        }
    }

    /// A policy with no delay between attempts
    pub fn immediate(steps: u32) -> Self {
        Self {
            initial: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
            steps,
            cap: None,
        }
    }

    /// Delay to wait after the given zero-based attempt, before jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial.as_secs_f64() * self.factor.powi(attempt as i32);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(extra)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::read()
    }
}

/// Run `operation` until it reports done
pub async fn retry_with_backoff<F, Fut>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    poll_with_backoff(backoff, cancel, || {
        let attempt = operation();
        async move { attempt.await.map(|done| done.then_some(())) }
    })
    .await
}

/// Run `operation` until it yields a value
pub async fn poll_with_backoff<T, F, Fut>(
    backoff: &Backoff,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let steps = backoff.steps.max(1);
    let mut last_error = None;

    for attempt in 0..steps {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match operation().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                tracing::debug!(attempt = attempt + 1, "operation not done yet");
            }
            Err(Error::Transient(message)) => {
                tracing::warn!(attempt = attempt + 1, error = %message, "transient failure");
                last_error = Some(message);
            }
            Err(e) => return Err(e),
        }

        if attempt + 1 < steps {
            let delay = backoff.jittered(backoff.delay_for_attempt(attempt));
            tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off");
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(Error::RetryTimeout {
        attempts: steps,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_op(
        calls: Arc<AtomicU32>,
        not_done: u32,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<bool>> + Send>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(n >= not_done)
            })
        }
    }

    #[test]
    fn test_delay_calculation() {
        let backoff = Backoff {
            initial: Duration::from_millis(1000),
            factor: 2.0,
            jitter: 0.0,
            steps: 5,
            cap: Some(Duration::from_millis(10000)),
        };

        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(10000));
    }

    #[test]
    fn test_named_policies() {
        let read = Backoff::read();
        let write = Backoff::write();
        assert!(read.steps > write.steps);
        assert_eq!(read.initial, write.initial);
        assert_eq!(read.factor, 1.5);
    }

    #[tokio::test]
    async fn test_succeeds_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &Backoff::immediate(5),
            &CancellationToken::new(),
            counting_op(calls.clone(), 4),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_times_out_when_budget_exceeded() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            &Backoff::immediate(5),
            &CancellationToken::new(),
            counting_op(calls.clone(), 5),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::RetryTimeout {
                attempts: 5,
                last_error: None
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_error_aborts_on_first_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_with_backoff(&Backoff::immediate(10), &CancellationToken::new(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<bool, _>(Error::Api("boom".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Api(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_and_surfaced() {
        let result: Result<()> =
            retry_with_backoff(&Backoff::immediate(3), &CancellationToken::new(), || async {
                Err::<bool, _>(Error::Transient("throttled".into()))
            })
            .await;

        match result {
            Err(Error::RetryTimeout {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.as_deref(), Some("throttled"));
            }
            other => panic!("expected RetryTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_returns_value() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let value = poll_with_backoff(&Backoff::immediate(4), &CancellationToken::new(), || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Error>((n == 2).then_some("ready")) }
        })
        .await
        .unwrap();

        assert_eq!(value, "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));

        let result =
            retry_with_backoff(&Backoff::read(), &cancel, counting_op(calls.clone(), 0)).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let backoff = Backoff {
            initial: Duration::from_secs(3600),
            ..Backoff::read()
        };

        let handle = tokio::spawn(async move {
            retry_with_backoff(&backoff, &cancel, || async { Ok::<_, Error>(false) }).await
        });
        tokio::task::yield_now().await;
        trigger.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
