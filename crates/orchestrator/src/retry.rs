//! Shared retry helper with exponential back-off and cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use pipeline::{DeliveryError, DeliveryId, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::ensure_active;

/// Back-off before the attempt that follows attempt `attempt_index` (0-based):
/// `base × 2^attempt_index`.
pub fn backoff_delay(base: Duration, attempt_index: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt_index))
}

/// Runs `operation` up to `max_retries + 1` times.
///
/// Cancellation is checked before every attempt; a signalled token also cuts
/// a back-off sleep short. Errors whose [`RetryPolicy`] is `NonRetryable` are
/// returned immediately. Retryable errors are retried after
/// [`backoff_delay`], or after the error's own `after` hint when that is
/// longer. When attempts run out the result is
/// [`DeliveryError::RetriesExhausted`].
pub async fn retry_with_backoff<T, F, Fut>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
    token: &CancellationToken,
    delivery_id: DeliveryId,
) -> Result<T, DeliveryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let attempts = max_retries.saturating_add(1);
    let mut last_message = String::new();

    for attempt in 0..attempts {
        ensure_active(token, delivery_id)?;

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        let RetryPolicy::Retryable { after } = error.retry_policy() else {
            debug!(%delivery_id, attempt, %error, "Non-retryable failure");
            return Err(error);
        };

        last_message = error.to_string();
        if attempt + 1 == attempts {
            break;
        }

        let backoff = backoff_delay(base_delay, attempt);
        let wait = after.map_or(backoff, |hint| hint.max(backoff));
        warn!(
            %delivery_id,
            attempt = attempt + 1,
            max_attempts = attempts,
            wait_ms = wait.as_millis() as u64,
            %error,
            "Attempt failed, will retry"
        );
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }

    // A cancellation that interrupted the last back-off wins over exhaustion.
    ensure_active(token, delivery_id)?;
    Err(DeliveryError::RetriesExhausted {
        attempts,
        last_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn transient() -> DeliveryError {
        DeliveryError::transient("connection reset")
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(10);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(10));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(20));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures_with_exponential_waits() {
        let delay = Duration::from_millis(10);
        let token = CancellationToken::new();
        let started: Arc<Mutex<Vec<Instant>>> = Arc::default();

        let value = retry_with_backoff(
            |attempt| {
                let started = Arc::clone(&started);
                async move {
                    started.lock().push(Instant::now());
                    if attempt < 3 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            },
            3,
            delay,
            &token,
            DeliveryId::new_random(),
        )
        .await
        .unwrap();

        assert_eq!(value, "done");
        let started = started.lock();
        assert_eq!(started.len(), 4);
        for (index, expected) in [10u64, 20, 40].into_iter().enumerate() {
            let gap = started[index + 1] - started[index];
            assert!(gap >= Duration::from_millis(expected), "gap {index} was {gap:?}");
            assert!(gap < Duration::from_millis(expected + 5), "gap {index} was {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failures_are_not_retried() {
        let calls = Arc::new(Mutex::new(0u32));
        let before = Instant::now();

        let result: Result<(), _> = retry_with_backoff(
            |_| {
                let calls = Arc::clone(&calls);
                async move {
                    *calls.lock() += 1;
                    Err(DeliveryError::AuthFailure {
                        message: "Unauthorized".into(),
                    })
                }
            },
            3,
            Duration::from_millis(10),
            &CancellationToken::new(),
            DeliveryId::new_random(),
        )
        .await;

        assert!(matches!(result, Err(DeliveryError::AuthFailure { .. })));
        assert_eq!(*calls.lock(), 1);
        assert_eq!(Instant::now(), before, "no back-off sleep happened");
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempts_and_last_message() {
        let result: Result<(), _> = retry_with_backoff(
            |attempt| async move { Err(DeliveryError::transient(format!("try {attempt}"))) },
            2,
            Duration::from_millis(1),
            &CancellationToken::new(),
            DeliveryId::new_random(),
        )
        .await;

        match result {
            Err(DeliveryError::RetriesExhausted {
                attempts,
                last_message,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_message.contains("try 2"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(Mutex::new(0u32));

        let result: Result<(), _> = retry_with_backoff(
            |_| {
                let calls = Arc::clone(&calls);
                async move {
                    *calls.lock() += 1;
                    Ok(())
                }
            },
            3,
            Duration::from_millis(1),
            &token,
            DeliveryId::new_random(),
        )
        .await;

        assert!(matches!(result, Err(DeliveryError::Cancelled { .. })));
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn server_hint_extends_the_wait() {
        let started: Arc<Mutex<Vec<Instant>>> = Arc::default();

        retry_with_backoff(
            |attempt| {
                let started = Arc::clone(&started);
                async move {
                    started.lock().push(Instant::now());
                    if attempt == 0 {
                        Err(DeliveryError::Transient {
                            message: "rate limited".into(),
                            retry_after: Some(Duration::from_secs(2)),
                        })
                    } else {
                        Ok(())
                    }
                }
            },
            1,
            Duration::from_millis(10),
            &CancellationToken::new(),
            DeliveryId::new_random(),
        )
        .await
        .unwrap();

        let started = started.lock();
        assert!(started[1] - started[0] >= Duration::from_secs(2));
    }
}
