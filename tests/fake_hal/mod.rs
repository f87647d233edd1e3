#![allow(dead_code)]

//! Fake HAL pieces that share a simulated microsecond clock.
//!
//! Every pin poll costs one microsecond and every delay advances the clock by exactly the
//! requested amount, so pulse widths measured by the driver are deterministic.

pub mod clock;
mod concurrent;
pub mod delay;
pub mod digital;
