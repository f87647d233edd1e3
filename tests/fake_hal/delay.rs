use super::concurrent;
use embedded_hal::delay::DelayNs;

/// Sleeps by advancing the named clock.
#[derive(Debug)]
pub struct Delay {
    name: &'static str,
}

impl Delay {
    pub fn new(name: &'static str) -> Delay {
        Delay { name }
    }
}

impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        concurrent::add_to_named_value(self.name, u64::from(ns.div_ceil(1000)));
    }

    fn delay_us(&mut self, us: u32) {
        concurrent::add_to_named_value(self.name, u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        concurrent::add_to_named_value(self.name, u64::from(ms) * 1000);
    }
}
