use std::time::{Duration, Instant};

/// The wait primitive of the scheduling loop. The loop only ever asks for
/// the time elapsed since the clock's origin and for a short bounded pause,
/// so a higher-resolution timer can replace the default without touching
/// the loop.
pub trait Clock: Send {
    /// Time elapsed since the clock was created.
    fn now(&mut self) -> Duration;

    /// Wait for at most `max`.
    fn pause(&mut self, max: Duration);
}

/// Wall clock backed by `Instant` and `thread::sleep`.
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
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }

    fn pause(&mut self, max: Duration) {
        std::thread::sleep(max);
    }
}

/// Simulated clock: time only moves when the loop pauses. Used for
/// offline runs and tests, where it makes the loop fully deterministic.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Clock for ManualClock {
    fn now(&mut self) -> Duration {
        self.now
    }

    fn pause(&mut self, max: Duration) {
        self.now += max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_pause() {
        let mut clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.pause(Duration::from_millis(1));
        clock.advance(Duration::from_millis(4));
        assert_eq!(clock.now(), Duration::from_millis(5));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let mut clock = SystemClock::new();
        let a = clock.now();
        clock.pause(Duration::from_millis(1));
        assert!(clock.now() > a);
    }
}
