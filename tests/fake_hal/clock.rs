use super::concurrent;
use std::time::Duration;

/// Starts (or restarts) the named clock at zero.
pub fn reset(name: &'static str) {
    concurrent::set_named_value(name, 0);
}

/// The current time of the named clock in microseconds.
pub fn now(name: &str) -> u64 {
    concurrent::get_named_value(name)
}

pub fn advance(name: &str, duration: Duration) {
    concurrent::add_to_named_value(name, duration.as_micros() as u64);
}

pub fn elapsed_since(name: &str, start: u64) -> Duration {
    Duration::from_micros(now(name).saturating_sub(start))
}

/// Reads the clock, then advances it by one microsecond.
pub(super) fn tick(name: &str) -> u64 {
    concurrent::get_and_increment_named_value(name)
}
