/// Virtual session clock
///
/// Elapsed session time as the listener experiences it: scheduler time since
/// the session started plus everything skipped forward.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::timer::Scheduler;

#[derive(Debug, Clone, Copy, Default)]
struct ClockState {
    started_at: Duration,
    skipped_ms: u64,
}

pub struct VirtualClock {
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<ClockState>,
}

impl VirtualClock {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        let started_at = scheduler.now();
        Self {
            scheduler,
            state: Mutex::new(ClockState {
                started_at,
                skipped_ms: 0,
            }),
        }
    }

    /// Reset for a new session: `started_at = now`, `skipped_ms = 0`
    pub fn restart(&self) {
        let now = self.scheduler.now();
        *self.state.lock() = ClockState {
            started_at: now,
            skipped_ms: 0,
        };
    }

    /// Jump the present moment forward
    pub fn skip(&self, seconds: u32) {
        let mut state = self.state.lock();
        state.skipped_ms += u64::from(seconds) * 1000;
        tracing::debug!(seconds, skipped_ms = state.skipped_ms, "Virtual clock skipped forward");
    }

    pub fn skipped_ms(&self) -> u64 {
        self.state.lock().skipped_ms
    }

    pub fn elapsed_ms(&self) -> u64 {
        let state = *self.state.lock();
        let real = self.scheduler.now().saturating_sub(state.started_at);
        real.as_millis() as u64 + state.skipped_ms
    }

    /// Delay until `offset_ms` of virtual time, or `None` if already reached
    pub fn delay_until(&self, offset_ms: u64) -> Option<Duration> {
        let elapsed = self.elapsed_ms();
        if offset_ms > elapsed {
            Some(Duration::from_millis(offset_ms - elapsed))
        } else {
            None
        }
    }
}
