/// Sound preview
///
/// A short standalone sample of an ambiance sound, independent of any session.
/// Plays at the preview volume and fades out over its last seconds.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::effects::LinearRamp;
use super::loader::{ClipLoader, LoadResult};
use super::player::AudioPlayerHandle;
use super::source::{AmbianceSound, AudioSourceType};
use crate::scheduling::TimerHandle;

pub const PREVIEW_LENGTH: Duration = Duration::from_secs(5);
pub const PREVIEW_FADE: Duration = Duration::from_secs(2);
const PREVIEW_TICK: Duration = Duration::from_millis(100);

#[derive(Default)]
struct PreviewState {
    generation: u64,
    sound: Option<AmbianceSound>,
    handle: Option<AudioPlayerHandle>,
    timer: Option<TimerHandle>,
}

struct Inner {
    loader: ClipLoader,
    volume: f32,
    state: Mutex<PreviewState>,
}

pub struct PreviewPlayer {
    inner: Arc<Inner>,
}

impl PreviewPlayer {
    pub fn new(loader: ClipLoader, volume: f32) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                volume: volume.clamp(0.0, 1.0),
                state: Mutex::new(PreviewState::default()),
            }),
        }
    }

    /// Start a preview, cancelling the one already playing
    pub fn play(&self, sound: AmbianceSound) {
        let (generation, previous) = {
            let mut state = self.inner.state.lock();
            let previous = Inner::clear(&mut state);
            state.sound = Some(sound);
            (state.generation, previous)
        };
        drop(previous);

        tracing::info!("Previewing {}", sound);

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .loader
            .load_async(AudioSourceType::Preview, sound.asset_name(), move |result| {
                if let Some(inner) = weak.upgrade() {
                    Inner::attach(&inner, generation, result);
                }
            });
    }

    /// Idempotent
    pub fn stop(&self) {
        let previous = Inner::clear(&mut self.inner.state.lock());
        if previous.is_some() {
            tracing::debug!("Preview stopped");
        }
    }

    /// Sound whose preview is loading or playing
    pub fn active_sound(&self) -> Option<AmbianceSound> {
        self.inner.state.lock().sound
    }
}

impl Inner {
    /// Cancel the timer and hand back the handle for release outside the lock
    fn clear(state: &mut PreviewState) -> Option<AudioPlayerHandle> {
        state.generation += 1;
        state.sound = None;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.handle.take()
    }

    fn attach(this: &Arc<Self>, generation: u64, result: LoadResult) {
        let mut handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Preview could not be played: {}", e);
                let mut state = this.state.lock();
                if state.generation == generation {
                    state.sound = None;
                }
                return;
            }
        };

        let mut state = this.state.lock();
        if state.generation != generation {
            return;
        }

        handle.set_volume(this.volume);
        handle.play();
        state.handle = Some(handle);

        let weak = Arc::downgrade(this);
        let ramp = LinearRamp::over(this.volume, 0.0, PREVIEW_FADE, PREVIEW_TICK);
        state.timer = Some(this.loader.scheduler().schedule(
            PREVIEW_LENGTH.saturating_sub(PREVIEW_FADE),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::fade_step(&inner, generation, ramp, 0);
                }
            }),
        ));
    }

    fn fade_step(this: &Arc<Self>, generation: u64, ramp: LinearRamp, step: u32) {
        let finished = {
            let mut state = this.state.lock();
            if state.generation != generation {
                return;
            }

            if let Some(handle) = state.handle.as_mut() {
                handle.set_volume(ramp.value_at(step));
            }

            if ramp.is_complete(step) {
                state.timer = None;
                state.sound = None;
                state.handle.take()
            } else {
                let weak = Arc::downgrade(this);
                state.timer = Some(this.loader.scheduler().schedule(
                    PREVIEW_TICK,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            Inner::fade_step(&inner, generation, ramp, step + 1);
                        }
                    }),
                ));
                None
            }
        };

        if let Some(mut handle) = finished {
            handle.release();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.cancel();
        }
    }
}
