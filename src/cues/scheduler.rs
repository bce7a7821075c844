/// Cue scheduler
///
/// Fires a sparse list of cues against the shared virtual clock. Each entry is
/// its own one-shot timer; an entry fires at most once per `start()`, and a
/// skip marks everything behind the new present as fired without playing it.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{Cue, CueScheduleEntry};
use crate::messaging::{EventBus, SessionEvent};
use crate::scheduling::{Scheduler, TimerHandle, VirtualClock};

/// Plays whatever a schedule entry asks for
pub trait CuePlayer: Send + Sync + 'static {
    fn play(&self, cue: &Cue);

    /// Stop and release anything in flight. Must be idempotent.
    fn stop(&self);

    /// Whether a skip interrupts the cue currently playing
    fn interrupted_by_skip(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct ScheduleState {
    generation: u64,
    active: bool,
    entries: Vec<CueScheduleEntry>,
    timers: Vec<TimerHandle>,
}

struct Inner<P: CuePlayer> {
    name: &'static str,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<VirtualClock>,
    player: Arc<P>,
    bus: EventBus,
    state: Mutex<ScheduleState>,
}

pub struct CueScheduler<P: CuePlayer> {
    inner: Arc<Inner<P>>,
}

impl<P: CuePlayer> CueScheduler<P> {
    pub fn new(
        name: &'static str,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<VirtualClock>,
        player: Arc<P>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                scheduler,
                clock,
                player,
                bus,
                state: Mutex::new(ScheduleState::default()),
            }),
        }
    }

    /// Replace the schedule and arm a timer per entry
    pub fn start(&self, entries: Vec<CueScheduleEntry>) {
        self.stop();

        let (generation, due) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.active = true;
            state.entries = entries
                .into_iter()
                .map(|entry| CueScheduleEntry {
                    fired: false,
                    ..entry
                })
                .collect();

            tracing::debug!(
                schedule = self.inner.name,
                entries = state.entries.len(),
                "Cue schedule started"
            );

            let due = Inner::arm(&self.inner, &mut state);
            (state.generation, due)
        };

        for index in due {
            Inner::fire(&self.inner, generation, index);
        }
    }

    /// Advance the shared clock and resynchronise this schedule
    pub fn skip_forward(&self, seconds: u32) {
        self.inner.clock.skip(seconds);
        self.resync_after_skip();
    }

    /// Resynchronise after the shared clock jumped forward
    pub fn resync_after_skip(&self) {
        if !self.inner.state.lock().active {
            return;
        }

        if self.inner.player.interrupted_by_skip() {
            self.inner.player.stop();
        }

        let skipped = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            state.generation += 1;
            for timer in state.timers.drain(..) {
                timer.cancel();
            }

            let elapsed = self.inner.clock.elapsed_ms();
            let skipped: Vec<(u32, Cue)> = state
                .entries
                .iter_mut()
                .filter(|entry| !entry.fired && entry.offset_ms() <= elapsed)
                .map(|entry| {
                    entry.fired = true;
                    (entry.offset_seconds, entry.cue.clone())
                })
                .collect();

            // Everything at or behind `elapsed` is fired now, so nothing is due
            let _ = Inner::arm(&self.inner, &mut state);
            skipped
        };

        for (offset_seconds, cue) in skipped {
            self.inner.bus.publish(SessionEvent::CueSkipped {
                schedule: self.inner.name,
                offset_seconds,
                cue,
            });
        }
    }

    /// Cancel every pending timer and stop the player. Safe to call repeatedly.
    pub fn stop(&self) {
        let was_active = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            for timer in state.timers.drain(..) {
                timer.cancel();
            }
            std::mem::replace(&mut state.active, false)
        };

        self.inner.player.stop();

        if was_active {
            tracing::debug!(schedule = self.inner.name, "Cue schedule stopped");
        }
    }

    pub fn entries(&self) -> Vec<CueScheduleEntry> {
        self.inner.state.lock().entries.clone()
    }

    pub fn fired_count(&self) -> usize {
        self.inner.state.lock().entries.iter().filter(|e| e.fired).count()
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    pub fn player(&self) -> &Arc<P> {
        &self.inner.player
    }
}

impl<P: CuePlayer> Inner<P> {
    /// Schedule every unfired entry; returns the indexes already due
    fn arm(this: &Arc<Self>, state: &mut ScheduleState) -> Vec<usize> {
        let generation = state.generation;
        let mut due = Vec::new();
        let mut timers = Vec::new();

        for (index, entry) in state.entries.iter().enumerate() {
            if entry.fired {
                continue;
            }
            match this.clock.delay_until(entry.offset_ms()) {
                Some(delay) => {
                    let weak: Weak<Self> = Arc::downgrade(this);
                    let timer = this.scheduler.schedule(
                        delay,
                        Box::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                Inner::fire(&inner, generation, index);
                            }
                        }),
                    );
                    timers.push(timer);
                }
                None => due.push(index),
            }
        }

        state.timers.extend(timers);
        due
    }

    fn fire(this: &Arc<Self>, generation: u64, index: usize) {
        let (offset_seconds, cue) = {
            let mut state = this.state.lock();
            if state.generation != generation || !state.active {
                return;
            }
            let Some(entry) = state.entries.get_mut(index) else {
                return;
            };
            if entry.fired {
                return;
            }
            entry.fired = true;
            (entry.offset_seconds, entry.cue.clone())
        };

        tracing::info!(
            schedule = this.name,
            offset_seconds,
            elapsed_ms = this.clock.elapsed_ms(),
            "Firing {}",
            cue
        );

        this.bus.publish(SessionEvent::CueFired {
            schedule: this.name,
            offset_seconds,
            cue: cue.clone(),
        });
        this.player.play(&cue);
    }
}

impl<P: CuePlayer> Drop for CueScheduler<P> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.active = false;
        for timer in state.timers.drain(..) {
            timer.cancel();
        }
    }
}
