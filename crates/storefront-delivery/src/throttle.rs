//! Rate-limiting combinators over a `Clock`

use crate::Clock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Leading-edge throttle: admits a call, then rejects calls until
/// `interval` has passed since the last admitted one.
pub struct Throttle {
    interval: Duration,
    clock: Arc<dyn Clock>,
    last_admitted: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            clock,
            last_admitted: None,
        }
    }

    /// Throttle targeting roughly `hz` calls per second
    pub fn per_second(hz: u32, clock: Arc<dyn Clock>) -> Self {
        Self::new(Duration::from_secs(1) / hz.max(1), clock)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a call made now may proceed; records it if so
    pub fn try_acquire(&mut self) -> bool {
        let now = self.clock.now();
        let open = self
            .last_admitted
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);

        if open {
            self.last_admitted = Some(now);
        }
        open
    }

    /// Run `f` if the throttle admits the call
    pub fn call<R>(&mut self, f: impl FnOnce() -> R) -> Option<R> {
        if self.try_acquire() {
            Some(f())
        } else {
            None
        }
    }

    /// Forget the last admitted call
    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}

/// Trailing-edge debounce: keeps the latest value and releases it once
/// no new value has arrived for `wait`.
pub struct Debouncer<T> {
    wait: Duration,
    clock: Arc<dyn Clock>,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(wait: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            wait,
            clock,
            pending: None,
        }
    }

    /// Record a new value, restarting the quiet period
    pub fn trigger(&mut self, value: T) {
        self.pending = Some((value, self.clock.now()));
    }

    /// Take the pending value if the quiet period has elapsed
    pub fn poll(&mut self) -> Option<T> {
        let now = self.clock.now();
        match &self.pending {
            Some((_, at)) if now.saturating_duration_since(*at) >= self.wait => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    /// Time left before `poll` would release the pending value
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.pending
            .as_ref()
            .map(|(_, at)| self.wait.saturating_sub(now.saturating_duration_since(*at)))
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value without releasing it
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    #[test]
    fn test_throttle_leading_edge() {
        let clock = Arc::new(ManualClock::new());
        let mut throttle = Throttle::new(Duration::from_millis(16), clock.clone());

        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());

        clock.advance(Duration::from_millis(15));
        assert!(!throttle.try_acquire());

        clock.advance(Duration::from_millis(1));
        assert_eq!(throttle.call(|| 42), Some(42));
        assert_eq!(throttle.call(|| 42), None);
    }

    #[test]
    fn test_throttle_caps_rate() {
        let clock = Arc::new(ManualClock::new());
        let mut throttle = Throttle::per_second(60, clock.clone());

        // One scroll event per millisecond for a full second.
        let admitted = (0..1000)
            .filter(|_| {
                let ok = throttle.try_acquire();
                clock.advance(Duration::from_millis(1));
                ok
            })
            .count();
        assert!(admitted <= 61, "admitted {}", admitted);
        assert!(admitted >= 55, "admitted {}", admitted);
    }

    #[test]
    fn test_debounce_releases_latest_after_quiet_period() {
        let clock = Arc::new(ManualClock::new());
        let mut debouncer = Debouncer::new(Duration::from_millis(300), clock.clone());

        debouncer.trigger("sn");
        clock.advance(Duration::from_millis(200));
        debouncer.trigger("sneak");
        clock.advance(Duration::from_millis(200));
        assert_eq!(debouncer.poll(), None);
        assert_eq!(debouncer.remaining(), Some(Duration::from_millis(100)));

        clock.advance(Duration::from_millis(100));
        assert_eq!(debouncer.poll(), Some("sneak"));
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.poll(), None);
    }
}
