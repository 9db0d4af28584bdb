//! Deterministic timers driven by the caller's clock.
//!
//! Nothing here sleeps or spawns; the host passes `Instant`s in from its event
//! loop and asks whether something is due.

use std::time::{Duration, Instant};

/// Single-shot timer that restarts on every trigger.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Restart the countdown.
    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// `true` exactly once after the delay has elapsed since the last trigger.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Fixed-period timer.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next: Instant,
}

impl IntervalTimer {
    /// First tick is one period after `start`. Returns `None` for a zero period.
    pub fn new(period: Duration, start: Instant) -> Option<Self> {
        if period.is_zero() {
            return None;
        }
        Some(Self {
            period,
            next: start + period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// `true` when a tick is due. Missed ticks collapse into one.
    pub fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        // Land on the first tick strictly after `now`.
        let late = (now - self.next).as_nanos() % self.period.as_nanos();
        let late = Duration::from_nanos(u64::try_from(late).unwrap_or(0));
        self.next = now + (self.period - late);
        true
    }

    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_restarts_on_trigger() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(800));
        assert!(!d.fire(t0));

        d.trigger(t0);
        d.trigger(t0 + Duration::from_millis(500));
        assert!(!d.fire(t0 + Duration::from_millis(900)));
        assert!(d.fire(t0 + Duration::from_millis(1300)));
        assert!(!d.fire(t0 + Duration::from_millis(2000)));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_interval_collapses_missed_ticks() {
        let t0 = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_secs(60), t0).unwrap();

        assert!(!timer.due(t0 + Duration::from_secs(59)));
        assert!(timer.due(t0 + Duration::from_secs(60)));
        assert!(!timer.due(t0 + Duration::from_secs(61)));

        assert!(timer.due(t0 + Duration::from_secs(400)));
        assert!(!timer.due(t0 + Duration::from_secs(419)));
        assert_eq!(
            timer.time_until_next(t0 + Duration::from_secs(419)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_interval_rejects_zero_period() {
        assert!(IntervalTimer::new(Duration::ZERO, Instant::now()).is_none());
    }

    #[test]
    fn test_interval_skips_many_missed_ticks_at_once() {
        let t0 = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_nanos(1), t0).unwrap();
        let later = t0 + Duration::from_secs(3600);
        assert!(timer.due(later));
        assert!(!timer.due(later));
        assert_eq!(timer.time_until_next(later), Duration::from_nanos(1));

        let mut timer = IntervalTimer::new(Duration::from_millis(250), t0).unwrap();
        assert!(timer.due(t0 + Duration::from_millis(1100)));
        assert_eq!(
            timer.time_until_next(t0 + Duration::from_millis(1100)),
            Duration::from_millis(150)
        );
    }
}
