/// Audio effects module
///
/// Volume ramps applied tick by tick from the timer loop.

pub mod fade;

pub use fade::{fadeout_seconds, steps_for, LinearRamp};
