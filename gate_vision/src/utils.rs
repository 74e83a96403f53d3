use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for the engine. Readings are offsets from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        spin_sleep::sleep(duration);
    }
}

/// Clock that only moves when told to. Sleeping advances it.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    pub fn set(&self, now: Duration) {
        self.nanos.store(now.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Keeps iterations at least `interval` apart.
pub struct FrameThrottle {
    started_at: Duration,
    interval: Duration,
}

impl FrameThrottle {
    pub fn new(interval: Duration, clock: &impl Clock) -> Self {
        Self {
            started_at: clock.now(),
            interval,
        }
    }

    /// Marks the start of an iteration.
    pub fn mark(&mut self, clock: &impl Clock) {
        self.started_at = clock.now();
    }

    /// Sleeps whatever is left of the interval since the last mark.
    pub fn wait(&self, clock: &impl Clock) -> Duration {
        let elapsed = clock.now().saturating_sub(self.started_at);
        let remaining = self.interval.saturating_sub(elapsed);
        if !remaining.is_zero() {
            clock.sleep(remaining);
        }
        remaining
    }
}

/// Exponential back-off capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_sleeps_the_remainder() {
        let clock = ManualClock::starting_at(Duration::from_secs(1));
        let mut throttle = FrameThrottle::new(Duration::from_millis(200), &clock);

        throttle.mark(&clock);
        clock.advance(Duration::from_millis(50));
        assert_eq!(throttle.wait(&clock), Duration::from_millis(150));
        assert_eq!(clock.now(), Duration::from_millis(1200));

        throttle.mark(&clock);
        clock.advance(Duration::from_millis(500));
        assert_eq!(throttle.wait(&clock), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, max, 0), base);
        assert_eq!(backoff_delay(base, max, 1), base);
        assert_eq!(backoff_delay(base, max, 2), Duration::from_secs(10));
        assert_eq!(backoff_delay(base, max, 4), Duration::from_secs(40));
        assert_eq!(backoff_delay(base, max, 5), max);
        assert_eq!(backoff_delay(base, max, u32::MAX), max);
    }
}
