//! Polling waiter.
//!
//! Every bounded wait in the engine goes through [`wait_for`]: the check is
//! called, then the waiter sleeps for the interval, until the check yields a
//! value or the deadline passes. There is no default timeout.

use std::future::Future;
use std::time::Duration;

use pagepilot_protocols::PageError;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::error::{AutomationError, Result};

/// Failure of a single check.
#[derive(Debug)]
pub enum PollError {
    /// Counts as "not yet".
    Transient(String),
    /// Aborts the wait with this error.
    Fatal(AutomationError),
}

impl From<AutomationError> for PollError {
    /// Application errors and disconnections are fatal; the rest are retried.
    fn from(e: AutomationError) -> Self {
        if e.is_disconnect() || matches!(e, AutomationError::Application(_)) {
            PollError::Fatal(e)
        } else {
            PollError::Transient(e.to_string())
        }
    }
}

impl From<PageError> for PollError {
    fn from(e: PageError) -> Self {
        AutomationError::from(e).into()
    }
}

/// Poll until `check` yields a value.
///
/// Fails with [`AutomationError::Timeout`] once `timeout` has elapsed; the
/// check gets one last call at the deadline, so the elapsed time lies in
/// `[timeout, timeout + interval]`.
pub async fn wait_for<T, F, Fut>(
    mut check: F,
    timeout: Duration,
    interval: Duration,
    label: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, PollError>>,
{
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        match check().await {
            Ok(Some(value)) => {
                debug!(label, polls, elapsed_ms = start.elapsed().as_millis() as u64, "Wait satisfied");
                return Ok(value);
            }
            Ok(None) => {}
            Err(PollError::Transient(message)) => {
                trace!(label, %message, "Transient poll failure");
            }
            Err(PollError::Fatal(e)) => return Err(e),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            debug!(label, polls, "Wait timed out");
            return Err(AutomationError::timeout(label, timeout));
        }
        sleep(interval.min(timeout - elapsed)).await;
    }
}

/// Poll until `predicate` returns true.
pub async fn wait_until<F, Fut>(
    mut predicate: F,
    timeout: Duration,
    interval: Duration,
    label: &str,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<bool, PollError>>,
{
    wait_for(
        || {
            let fut = predicate();
            async move { fut.await.map(|done| done.then_some(())) }
        },
        timeout,
        interval,
        label,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_polls() {
        for k in [0u32, 1, 3, 7] {
            let polls = Arc::new(AtomicU32::new(0));
            let counter = polls.clone();
            wait_until(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Ok(n > k) }
                },
                Duration::from_secs(5),
                INTERVAL,
                "k polls",
            )
            .await
            .unwrap();

            let n = polls.load(Ordering::SeqCst);
            assert!(n >= k && n <= k + 1, "k={} polls={}", k, n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds() {
        let start = Instant::now();
        let err = wait_until(
            || async { Ok(false) },
            Duration::from_millis(1_050),
            INTERVAL,
            "never",
        )
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_050));
        assert!(elapsed <= Duration::from_millis(1_150));
        match err {
            AutomationError::Timeout { label, timeout_ms } => {
                assert_eq!(label, "never");
                assert_eq!(timeout_ms, 1_050);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_swallowed() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let value = wait_for(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PollError::Transient("not rendered".to_string()))
                    } else {
                        Ok(Some(n))
                    }
                }
            },
            Duration::from_secs(1),
            INTERVAL,
            "transient",
        )
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_aborts() {
        let start = Instant::now();
        let err = wait_until(
            || async {
                Err::<bool, _>(AutomationError::Application("generation failed".to_string()).into())
            },
            Duration::from_secs(60),
            INTERVAL,
            "fatal",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AutomationError::Application(_)));
        assert!(start.elapsed() < INTERVAL);
    }

    #[test]
    fn test_poll_error_classification() {
        let fatal: PollError = PageError::TargetClosed("gone".to_string()).into();
        assert!(matches!(fatal, PollError::Fatal(_)));

        let transient: PollError = PageError::StaleElement("node 4".to_string()).into();
        assert!(matches!(transient, PollError::Transient(_)));

        let transient: PollError = AutomationError::timeout("inner", INTERVAL).into();
        assert!(matches!(transient, PollError::Transient(_)));
    }
}
