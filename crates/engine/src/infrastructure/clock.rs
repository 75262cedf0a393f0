//! Clock and random implementations.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::infrastructure::ports::{ClockPort, RandomPort};

/// System clock - uses real time.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// System random - uses real randomness.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Seeded random - reproducible sequences for replays and tests.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomPort for SeededRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(min..=max)
    }
}

/// Fixed clock for testing.
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Clock that tests move forward by hand.
#[cfg(test)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl ClockPort for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Fixed random for testing. The value is clamped into the requested range,
/// so `FixedRandom(i32::MAX)` always rolls the top and `FixedRandom(i32::MIN)`
/// always the bottom.
#[cfg(test)]
pub struct FixedRandom(pub i32);

#[cfg(test)]
impl RandomPort for FixedRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        self.0.clamp(min, max.max(min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_random_is_reproducible() {
        let a = SeededRandom::new(42);
        let b = SeededRandom::new(42);
        let rolls_a: Vec<i32> = (0..20).map(|_| a.gen_range(1, 100)).collect();
        let rolls_b: Vec<i32> = (0..20).map(|_| b.gen_range(1, 100)).collect();
        assert_eq!(rolls_a, rolls_b);
        assert!(rolls_a.iter().all(|r| (1..=100).contains(r)));
    }

    #[test]
    fn degenerate_ranges_return_min() {
        assert_eq!(SystemRandom::new().gen_range(7, 7), 7);
        assert_eq!(SeededRandom::new(1).gen_range(3, 3), 3);
    }

    #[test]
    fn fixed_random_clamps() {
        assert_eq!(FixedRandom(50).gen_range(1, 10), 10);
        assert_eq!(FixedRandom(-5).gen_range(1, 10), 1);
        assert_eq!(FixedRandom(4).gen_range(1, 10), 4);
    }
}
