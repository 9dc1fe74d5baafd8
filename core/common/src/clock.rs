//! Time source for freshness windows and token-bucket refills.
//!
//! All timestamps are Unix epoch milliseconds, the unit used on the wire.

use std::fmt::Debug;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// System clock implementation using `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
mod mock {
    use super::Clock;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Manually driven clock for tests.
    ///
    /// Clones share the same underlying time, so a clone handed to a service
    /// can be advanced from the test body.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        current: Arc<AtomicI64>,
    }

    impl MockClock {
        /// Create a clock frozen at `start_millis`.
        pub fn new(start_millis: i64) -> Self {
            Self {
                current: Arc::new(AtomicI64::new(start_millis)),
            }
        }

        /// Move time forward (or backward, for negative values).
        pub fn advance(&self, millis: i64) {
            self.current.fetch_add(millis, Ordering::SeqCst);
        }

        /// Jump to a specific time.
        pub fn set(&self, millis: i64) {
            self.current.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for MockClock {
        fn now_millis(&self) -> i64 {
            self.current.load(Ordering::SeqCst)
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use mock::MockClock;
