//! Testability ports for injecting time and randomness.

use chrono::{DateTime, Utc};

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub trait RandomPort: Send + Sync {
    /// Integer in the inclusive range `min..=max`.
    fn gen_range(&self, min: i32, max: i32) -> i32;
}
