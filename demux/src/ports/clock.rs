//! Time abstraction so the Watcher's poll cadence and backoff can be driven
//! deterministically in tests instead of sleeping in wall-clock time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// A source of time and a way to wait for it to advance.
///
/// Implementations must be `Send + Sync`: the Watcher holds one across
/// `.await` points.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Suspend the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The real clock: wall time, real sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        i64::try_from(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(i64::MAX)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock tests can drive without waiting in real time.
///
/// `sleep` returns immediately; tests that care about elapsed time inspect
/// [`FakeClock::now_millis`] and advance it themselves with [`FakeClock::advance`].
#[derive(Debug)]
pub struct FakeClock {
    millis: AtomicI64,
}

impl FakeClock {
    #[must_use]
    pub const fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(i64::try_from(by.as_millis()).unwrap_or(i64::MAX), Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait::async_trait]
impl Clock for FakeClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Yield once so callers that `select!` against cancellation still
        // get a chance to observe it, without actually waiting real time.
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn clocks_are_send_sync() {
        assert_send_sync::<SystemClock>();
        assert_send_sync::<FakeClock>();
    }

    #[tokio::test]
    async fn fake_clock_advances_on_sleep() {
        let clock = FakeClock::new(1_000);
        clock.sleep(Duration::from_millis(250)).await;
        assert_eq!(clock.now_millis(), 1_250);
    }

    #[tokio::test]
    async fn fake_clock_advance_is_additive() {
        let clock = FakeClock::new(0);
        clock.advance(Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_millis(), 3_000);
    }
}
