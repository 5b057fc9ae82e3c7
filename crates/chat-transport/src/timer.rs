//! Owned, cancellable timer handles for the connection actors.

use std::{future::pending, pin::Pin, time::Duration};

use tokio::time::{Instant, Sleep, sleep};

/// Roughly 30 years; stands in for deadlines `Instant` cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, saturating to [`FAR_FUTURE`] instead of overflowing.
fn deadline(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

/// A one-shot timer owned by a connection actor.
///
/// Dropping the inner [`Sleep`] is the cancellation, so a cancelled timer can
/// never fire late. `cancel` may be called any number of times.
#[derive(Debug, Default)]
pub(crate) struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, replacing any pending deadline.
    pub(crate) fn arm(&mut self, after: Duration) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline(after)),
            None => self.sleep = Some(Box::pin(sleep(after))),
        }
    }

    /// Arm the timer only if no deadline is pending.
    pub(crate) fn arm_if_idle(&mut self, after: Duration) {
        if self.sleep.is_none() {
            self.sleep = Some(Box::pin(sleep(after)));
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.sleep = None;
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Resolves when the armed deadline passes; never resolves while disarmed.
    pub(crate) async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => pending().await,
        }
    }
}
