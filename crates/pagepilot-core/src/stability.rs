//! Stability detection for streamed output.
//!
//! A specialization of [`wait_for`]: the check remembers the last value and
//! when it last changed, and yields once the window has passed quietly.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::error::Result;
use crate::wait::{wait_for, PollError};

/// One observation of a streamed signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    /// The application still shows its "generating" indicator.
    pub in_progress: bool,
}

impl<T> Sample<T> {
    pub fn new(value: T, in_progress: bool) -> Self {
        Self { value, in_progress }
    }
}

/// Last seen value and when it last changed.
struct Tracker<T> {
    last: Option<T>,
    last_change: Instant,
    window: Duration,
}

impl<T: PartialEq + Clone> Tracker<T> {
    fn observe(&mut self, sample: Sample<T>, label: &str) -> Option<T> {
        let now = Instant::now();
        if self.last.as_ref() != Some(&sample.value) {
            trace!(label, "Signal changed");
            self.last = Some(sample.value);
            self.last_change = now;
        }
        if sample.in_progress || now.duration_since(self.last_change) < self.window {
            return None;
        }
        self.last.clone()
    }
}

/// Wait until the sampled value has stopped changing.
///
/// Succeeds with the final value once the indicator is clear and the value
/// has been unchanged for `stable_window`. A change restarts the window.
/// Never succeeds while `in_progress` is asserted.
pub async fn wait_for_stable<T, F, Fut>(
    mut sample: F,
    timeout: Duration,
    stable_window: Duration,
    interval: Duration,
    label: &str,
) -> Result<T>
where
    T: PartialEq + Clone,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Sample<T>, PollError>>,
{
    let tracker = Mutex::new(Tracker {
        last: None,
        last_change: Instant::now(),
        window: stable_window,
    });
    let tracker = &tracker;

    wait_for(
        || {
            let next = sample();
            async move {
                let observed = next.await?;
                Ok(tracker.lock().observe(observed, label))
            }
        },
        timeout,
        interval,
        label,
    )
    .await
}
