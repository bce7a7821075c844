/// Ducking coordinator
///
/// Owns the duck multiplier. `duck()` and `unduck()` animate it toward a fixed
/// target in small steps; each call cancels the running animation and starts
/// from wherever the multiplier currently is, so the latest intent wins. The
/// coordinator never touches a player, it only notifies listeners.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::effects::LinearRamp;
use crate::messaging::{EventBus, SessionEvent};
use crate::scheduling::{Scheduler, TimerHandle};

pub const DUCK_TARGET: f32 = 0.25;
pub const UNDUCK_TARGET: f32 = 0.5;
pub const DUCK_STEPS: u32 = 8;
pub const DUCK_TICK: Duration = Duration::from_millis(100);

/// Closer than this the target is applied without animating
const SNAP_EPSILON: f32 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuckState {
    pub multiplier: f32,
    pub target: f32,
}

impl Default for DuckState {
    fn default() -> Self {
        Self {
            multiplier: UNDUCK_TARGET,
            target: UNDUCK_TARGET,
        }
    }
}

/// Receives every multiplier change
pub trait DuckListener: Send + Sync {
    fn duck_multiplier_changed(&self, multiplier: f32);
}

#[derive(Default)]
struct Animation {
    state: DuckState,
    generation: u64,
    timer: Option<TimerHandle>,
}

struct Inner {
    scheduler: Arc<dyn Scheduler>,
    bus: EventBus,
    animation: Mutex<Animation>,
    listeners: Mutex<Vec<Weak<dyn DuckListener>>>,
}

#[derive(Clone)]
pub struct DuckingCoordinator {
    inner: Arc<Inner>,
}

impl DuckingCoordinator {
    pub fn new(scheduler: Arc<dyn Scheduler>, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                bus,
                animation: Mutex::new(Animation::default()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn add_listener(&self, listener: Weak<dyn DuckListener>) {
        self.inner.listeners.lock().push(listener);
    }

    /// Lower the ambiance for a cue
    pub fn duck(&self) {
        tracing::debug!("Ducking ambiance");
        self.inner.bus.publish(SessionEvent::Ducked);
        Inner::animate_to(&self.inner, DUCK_TARGET);
    }

    /// Return the ambiance to its normal level
    pub fn unduck(&self) {
        tracing::debug!("Unducking ambiance");
        self.inner.bus.publish(SessionEvent::Unducked);
        Inner::animate_to(&self.inner, UNDUCK_TARGET);
    }

    pub fn multiplier(&self) -> f32 {
        self.inner.animation.lock().state.multiplier
    }

    pub fn state(&self) -> DuckState {
        self.inner.animation.lock().state
    }

    /// Cancel any animation and snap back to the unducked level
    pub fn reset(&self) {
        {
            let mut animation = self.inner.animation.lock();
            animation.generation += 1;
            if let Some(timer) = animation.timer.take() {
                timer.cancel();
            }
            animation.state = DuckState::default();
        }
        self.inner.notify(UNDUCK_TARGET);
    }
}

impl Inner {
    fn animate_to(this: &Arc<Self>, target: f32) {
        let snapped = {
            let mut animation = this.animation.lock();
            animation.generation += 1;
            if let Some(timer) = animation.timer.take() {
                timer.cancel();
            }
            animation.state.target = target;

            let from = animation.state.multiplier;
            if (from - target).abs() < SNAP_EPSILON {
                animation.state.multiplier = target;
                Some(target)
            } else {
                let ramp = LinearRamp::new(from, target, DUCK_STEPS);
                let generation = animation.generation;
                animation.timer = Some(Self::schedule_step(this, ramp, 1, generation));
                None
            }
        };

        if let Some(value) = snapped {
            this.notify(value);
        }
    }

    fn schedule_step(this: &Arc<Self>, ramp: LinearRamp, step: u32, generation: u64) -> TimerHandle {
        let weak = Arc::downgrade(this);
        this.scheduler.schedule(
            DUCK_TICK,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::step(&inner, ramp, step, generation);
                }
            }),
        )
    }

    fn step(this: &Arc<Self>, ramp: LinearRamp, step: u32, generation: u64) {
        let value = {
            let mut animation = this.animation.lock();
            if animation.generation != generation {
                return;
            }
            let value = ramp.value_at(step);
            animation.state.multiplier = value;
            animation.timer = if ramp.is_complete(step) {
                None
            } else {
                Some(Self::schedule_step(this, ramp, step + 1, generation))
            };
            value
        };

        this.notify(value);
    }

    /// Called without the animation lock held
    fn notify(&self, multiplier: f32) {
        let listeners: Vec<Arc<dyn DuckListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.duck_multiplier_changed(multiplier);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.animation.get_mut().timer.take() {
            timer.cancel();
        }
    }
}
