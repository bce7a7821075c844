/// Fade ramps
///
/// Fixed-tick linear ramps used by crossfades, the end-of-session fade-out,
/// ducking and previews.
use std::time::Duration;

/// Shortest and longest end-of-session fade-out
pub const MIN_FADEOUT_SECS: u32 = 10;
pub const MAX_FADEOUT_SECS: u32 = 30;

/// Linear ramp from `from` to `to` in `steps` equal ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRamp {
    from: f32,
    to: f32,
    steps: u32,
}

impl LinearRamp {
    pub fn new(from: f32, to: f32, steps: u32) -> Self {
        Self {
            from,
            to,
            steps: steps.max(1),
        }
    }

    /// Ramp spanning `length` at one step per `tick`
    pub fn over(from: f32, to: f32, length: Duration, tick: Duration) -> Self {
        Self::new(from, to, steps_for(length, tick))
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Value after `step` ticks; exact `to` at and beyond the last step
    pub fn value_at(&self, step: u32) -> f32 {
        if step >= self.steps {
            return self.to;
        }
        let progress = step as f32 / self.steps as f32;
        self.from + (self.to - self.from) * progress
    }

    pub fn is_complete(&self, step: u32) -> bool {
        step >= self.steps
    }
}

/// Number of ticks needed to cover `length`, at least one
pub fn steps_for(length: Duration, tick: Duration) -> u32 {
    if tick.is_zero() {
        return 1;
    }
    let steps = (length.as_millis() / tick.as_millis().max(1)) as u32;
    steps.max(1)
}

/// End-of-session fade-out length: 10% of the session, clamped to 10-30 s
pub fn fadeout_seconds(total_seconds: u32) -> u32 {
    let tenth = (f64::from(total_seconds) * 0.10).round() as u32;
    tenth.clamp(MIN_FADEOUT_SECS, MAX_FADEOUT_SECS)
}
