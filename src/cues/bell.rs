/// Bell cue player
///
/// Each strike gets its own handle so a double strike can ring over the tail
/// of the first one. Finished strikes are released by a shared poll timer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Cue, CuePlayer, PLAYBACK_POLL_INTERVAL};
use crate::audio_system::loader::{ClipLoader, LoadResult};
use crate::audio_system::source::BELL_ASSET;
use crate::audio_system::{AudioPlayerHandle, AudioSourceType};
use crate::messaging::{EventBus, SessionEvent};
use crate::scheduling::TimerHandle;

/// Pause between the two strikes of a double bell
pub const BELL_DOUBLE_STRIKE_GAP: Duration = Duration::from_millis(2500);

#[derive(Default)]
struct BellState {
    generation: u64,
    strikes: Vec<AudioPlayerHandle>,
    pending_strike: Option<TimerHandle>,
    poll: Option<TimerHandle>,
}

struct Inner {
    loader: ClipLoader,
    bus: EventBus,
    volume: f32,
    state: Mutex<BellState>,
}

pub struct BellPlayer {
    inner: Arc<Inner>,
}

impl BellPlayer {
    pub fn new(loader: ClipLoader, bus: EventBus, volume: f32) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                bus,
                volume: volume.clamp(0.0, 1.0),
                state: Mutex::new(BellState::default()),
            }),
        }
    }

    /// Strikes currently holding a player
    pub fn ringing(&self) -> usize {
        self.inner.state.lock().strikes.len()
    }
}

impl CuePlayer for BellPlayer {
    fn play(&self, cue: &Cue) {
        let Cue::Bell { double } = cue else {
            tracing::warn!("Bell player asked to play {}", cue);
            return;
        };

        let generation = self.inner.state.lock().generation;
        Inner::strike(&self.inner, generation);

        if *double {
            let weak = Arc::downgrade(&self.inner);
            let timer = self.inner.loader.scheduler().schedule(
                BELL_DOUBLE_STRIKE_GAP,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        Inner::strike(&inner, generation);
                    }
                }),
            );
            let mut state = self.inner.state.lock();
            if let Some(previous) = state.pending_strike.replace(timer) {
                previous.cancel();
            }
        }
    }

    fn stop(&self) {
        let strikes = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            for timer in [state.pending_strike.take(), state.poll.take()].into_iter().flatten() {
                timer.cancel();
            }
            std::mem::take(&mut state.strikes)
        };

        for mut strike in strikes {
            strike.release();
        }
    }
}

impl Inner {
    fn strike(this: &Arc<Self>, generation: u64) {
        if this.state.lock().generation != generation {
            return;
        }

        let weak = Arc::downgrade(this);
        this.loader
            .load_async(AudioSourceType::Bell, BELL_ASSET.to_string(), move |result| {
                if let Some(inner) = weak.upgrade() {
                    Inner::attach(&inner, generation, result);
                }
            });
    }

    fn attach(this: &Arc<Self>, generation: u64, result: LoadResult) {
        let mut state = this.state.lock();
        if state.generation != generation {
            // Stale load; dropping the handle releases it
            drop(state);
            return;
        }

        let mut handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                drop(state);
                tracing::warn!("Bell could not be played: {}", e);
                this.bus.publish(SessionEvent::CueFailed {
                    cue: Cue::Bell { double: false },
                    message: e.to_string(),
                });
                return;
            }
        };

        handle.set_volume(this.volume);
        handle.play();
        state.strikes.push(handle);

        if state.poll.is_none() {
            state.poll = Some(Self::schedule_poll(this, generation));
        }
    }

    fn schedule_poll(this: &Arc<Self>, generation: u64) -> TimerHandle {
        let weak = Arc::downgrade(this);
        this.loader.scheduler().schedule(
            PLAYBACK_POLL_INTERVAL,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::poll(&inner, generation);
                }
            }),
        )
    }

    fn poll(this: &Arc<Self>, generation: u64) {
        let finished = {
            let mut state = this.state.lock();
            if state.generation != generation {
                return;
            }

            let (finished, ringing): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.strikes).into_iter().partition(|s| s.is_finished());
            state.strikes = ringing;

            state.poll = if state.strikes.is_empty() {
                None
            } else {
                Some(Self::schedule_poll(this, generation))
            };
            finished
        };

        for mut strike in finished {
            strike.release();
        }
    }
}
