use std::{ops::RangeInclusive, time::Duration};

use rand::Rng;

pub const MIN_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    factor: f64,
    max_delay: Duration,
    jitter: RangeInclusive<f64>,
}

impl Backoff {
    pub fn new(
        start: Duration,
        factor: f64,
        max_delay: Duration,
        jitter: RangeInclusive<f64>,
    ) -> Self {
        Self {
            current: start,
            factor,
            max_delay,
            jitter,
        }
    }

        pub fn fixed(start: Duration, factor: f64, max_delay: Duration) -> Self {
        Self::new(start, factor, max_delay, 1.0..=1.0)
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn next_delay(&mut self) -> Duration {
        // Clamp in f64 first; Duration::mul_f64 panics on overflow.
        let ceiling = self.max_delay.as_secs_f64();
        let grown = (self.current.as_secs_f64() * self.factor).min(ceiling);
        let next = Duration::try_from_secs_f64(grown * self.sample_jitter())
            .unwrap_or(self.max_delay);
        self.current = next.max(MIN_DELAY);
        self.current
    }

    fn sample_jitter(&self) -> f64 {
        let (lo, hi) = (*self.jitter.start(), *self.jitter.end());
        if lo >= hi {
            return lo.max(0.0);
        }
        rand::thread_rng().gen_range(lo..=hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sequence_grows_then_saturates() {
        let mut backoff = Backoff::fixed(Duration::from_secs(10), 2.0, Duration::from_secs(120));
        assert_eq!(backoff.current(), Duration::from_secs(10));

        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![20, 40, 80, 120, 120, 120]);
    }

    #[test]
    fn fixed_sequence_is_min_of_previous_times_factor() {
        let max = Duration::from_secs(10);
        let mut backoff = Backoff::fixed(Duration::from_secs(2), 1.6, max);
        let mut previous = backoff.current();
        for _ in 0..12 {
            let next = backoff.next_delay();
            let expected = previous.mul_f64(1.6).min(max);
            let drift = if next > expected {
                next - expected
            } else {
                expected - next
            };
            assert!(drift < Duration::from_micros(1), "{next:?} vs {expected:?}");
            assert!(next >= previous);
            previous = next;
        }
        assert_eq!(previous, max);
    }

    #[test]
    fn jittered_delays_stay_within_ratio_bounds() {
        let max = Duration::from_secs(10);
        let mut backoff = Backoff::new(Duration::from_secs(2), 1.6, max, 0.85..=1.15);
        for _ in 0..50 {
            let base = backoff.current().mul_f64(1.6).min(max);
            let next = backoff.next_delay();
            assert!(next >= base.mul_f64(0.85).max(MIN_DELAY) - Duration::from_micros(1));
            assert!(next <= base.mul_f64(1.15) + Duration::from_micros(1));
        }
    }

    #[test]
    fn delay_is_floored() {
        let mut backoff = Backoff::fixed(Duration::from_millis(100), 0.1, Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), MIN_DELAY);

        let mut zeroed = Backoff::new(Duration::ZERO, 2.0, Duration::from_secs(1), 0.0..=0.0);
        assert_eq!(zeroed.next_delay(), MIN_DELAY);
    }

    #[test]
    fn huge_factor_saturates_instead_of_overflowing() {
        let max = Duration::from_secs(120);
        let mut backoff = Backoff::fixed(Duration::from_secs(10), 1e20, max);
        assert_eq!(backoff.next_delay(), max);
        assert_eq!(backoff.next_delay(), max);

        let mut unbounded = Backoff::new(Duration::MAX, 1e300, Duration::MAX, 1.0..=1.15);
        assert_eq!(unbounded.next_delay(), Duration::MAX);
    }
}
