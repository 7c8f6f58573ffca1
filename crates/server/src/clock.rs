//! Time source for the watchdog and transaction timestamps.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Where "now" comes from. Injectable so deadlock detection can be tested
/// without waiting out real thresholds.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// tokio's clock. Follows paused/advanced time in `test-util` runtimes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().expect("clock lock poisoned") += by;
    }

    /// Time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().expect("clock lock poisoned")
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_advance() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_secs(3));
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now() - start, Duration::from_millis(3500));
    }
}
