/// Ambiance loop controller
///
/// Keeps a short ambiance clip going for the whole session by crossfading two
/// handles before the clip runs out, and fades everything out near the end of
/// a finite session. Silence mode loops a short silent clip the same way so
/// the output stays open for cues and ducking.
///
/// ```text
///   Loading ─► Playing ─► LoadingNext ─► Crossfading ─┐
///                 ▲                                   │
///                 └───────────────────────────────────┘
///   any ─► FadingOut ─► Finished
/// ```
///
/// Applied volume per handle is `base * duck multiplier * lane gain`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::ducking::{DuckListener, DuckingCoordinator};
use super::effects::{fadeout_seconds, steps_for};
use super::loader::{ClipLoader, LoadResult};
use super::player::AudioPlayerHandle;
use super::preview::PreviewPlayer;
use super::source::{AmbianceSound, AudioSourceType};
use crate::messaging::{EventBus, SessionEvent};
use crate::scheduling::{TimerHandle, VirtualClock};

/// Volume update interval for crossfades and the fade-out
pub const AMBIANCE_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopPhase {
    Idle,
    Loading,
    Playing,
    LoadingNext,
    Crossfading { step: u32, steps: u32 },
    FadingOut { step: u32, steps: u32, from: [f32; 2] },
    Finished,
}

struct Lane {
    handle: AudioPlayerHandle,
    gain: f32,
}

struct LoopState {
    generation: u64,
    phase: LoopPhase,
    sound: AmbianceSound,
    total_seconds: u32,
    multiplier: f32,
    current: Option<Lane>,
    next: Option<Lane>,
    /// Scheduler time at which `current` began playing
    clip_started_at: Duration,
    next_started_at: Duration,
    crossfade_timer: Option<TimerHandle>,
    fadeout_timer: Option<TimerHandle>,
    tick_timer: Option<TimerHandle>,
}

impl LoopState {
    fn new(multiplier: f32) -> Self {
        Self {
            generation: 0,
            phase: LoopPhase::Idle,
            sound: AmbianceSound::None,
            total_seconds: 0,
            multiplier,
            current: None,
            next: None,
            clip_started_at: Duration::ZERO,
            next_started_at: Duration::ZERO,
            crossfade_timer: None,
            fadeout_timer: None,
            tick_timer: None,
        }
    }

    fn cancel_timers(&mut self) {
        for timer in [
            self.crossfade_timer.take(),
            self.fadeout_timer.take(),
            self.tick_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.cancel();
        }
    }

    fn take_lanes(&mut self) -> Vec<Lane> {
        [self.current.take(), self.next.take()].into_iter().flatten().collect()
    }
}

struct Inner {
    loader: ClipLoader,
    clock: Arc<VirtualClock>,
    bus: EventBus,
    base_volume: f32,
    state: Mutex<LoopState>,
}

pub struct AmbianceLoopController {
    inner: Arc<Inner>,
    ducking: DuckingCoordinator,
    preview: PreviewPlayer,
}

impl AmbianceLoopController {
    pub fn new(
        loader: ClipLoader,
        clock: Arc<VirtualClock>,
        ducking: DuckingCoordinator,
        bus: EventBus,
        base_volume: f32,
        preview_volume: f32,
    ) -> Self {
        let inner = Arc::new(Inner {
            loader: loader.clone(),
            clock,
            bus,
            base_volume: base_volume.clamp(0.0, 1.0),
            state: Mutex::new(LoopState::new(ducking.multiplier())),
        });

        let controller = Self {
            inner,
            preview: PreviewPlayer::new(loader, preview_volume),
            ducking,
        };
        controller.ducking.add_listener(controller.duck_listener());
        controller
    }

    /// Listener handle for the ducking coordinator
    pub fn duck_listener(&self) -> Weak<dyn DuckListener> {
        let listener: Arc<dyn DuckListener> = self.inner.clone();
        Arc::downgrade(&listener)
    }

    /// Begin the ambiance bed for a session; `total_seconds == 0` loops forever
    pub fn start(&self, sound: AmbianceSound, total_seconds: u32) {
        self.stop();

        let multiplier = self.ducking.multiplier();

        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.phase = LoopPhase::Loading;
            state.sound = sound;
            state.total_seconds = total_seconds;
            state.multiplier = multiplier;

            if total_seconds > 0 {
                Inner::arm_fadeout(&self.inner, &mut state);
            }
            state.generation
        };

        tracing::info!(
            "Starting ambiance {} ({})",
            sound,
            if total_seconds == 0 {
                "indefinite".to_string()
            } else {
                format!("{}s", total_seconds)
            }
        );

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .loader
            .load_async(AudioSourceType::Ambiance, sound.asset_name(), move |result| {
                if let Some(inner) = weak.upgrade() {
                    Inner::attach_current(&inner, generation, result);
                }
            });
    }

    /// Re-arm the fade-out after the shared clock jumped forward
    pub fn resync_after_skip(&self) {
        let mut state = self.inner.state.lock();
        let fading = matches!(state.phase, LoopPhase::FadingOut { .. });
        if state.total_seconds == 0
            || fading
            || matches!(state.phase, LoopPhase::Idle | LoopPhase::Finished)
        {
            return;
        }
        if let Some(timer) = state.fadeout_timer.take() {
            timer.cancel();
        }
        Inner::arm_fadeout(&self.inner, &mut state);
    }

    /// Cancel every timer, then release every handle. Safe to call repeatedly.
    pub fn stop(&self) {
        let lanes = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.cancel_timers();
            if state.phase != LoopPhase::Idle {
                tracing::debug!("Stopping ambiance {}", state.sound);
            }
            state.phase = LoopPhase::Idle;
            state.take_lanes()
        };

        for mut lane in lanes {
            lane.handle.release();
        }
    }

    pub fn preview(&self, sound: AmbianceSound) {
        self.preview.play(sound);
    }

    pub fn stop_preview(&self) {
        self.preview.stop();
    }

    pub fn previewing(&self) -> Option<AmbianceSound> {
        self.preview.active_sound()
    }

    pub fn phase(&self) -> LoopPhase {
        self.inner.state.lock().phase
    }

    /// Handles currently held (0, 1, or 2 during a crossfade)
    pub fn live_handles(&self) -> usize {
        let state = self.inner.state.lock();
        state.current.iter().chain(state.next.iter()).count()
    }
}

impl Drop for AmbianceLoopController {
    fn drop(&mut self) {
        self.stop();
        self.preview.stop();
    }
}

impl Inner {
    fn apply_volume(&self, multiplier: f32, lane: &mut Lane) {
        lane.handle.set_volume(self.base_volume * multiplier * lane.gain);
    }

    fn apply_all(&self, state: &mut LoopState) {
        let multiplier = state.multiplier;
        for lane in state.current.iter_mut().chain(state.next.iter_mut()) {
            self.apply_volume(multiplier, lane);
        }
    }

    fn window_for(sound: AmbianceSound, clip: Duration) -> Duration {
        sound.crossfade_window().min(clip / 2)
    }

    fn clip_length(state: &LoopState, lane: &Lane) -> Duration {
        lane.handle
            .duration()
            .filter(|length| !length.is_zero())
            .unwrap_or_else(|| state.sound.authored_length())
    }

    /// Session time left on the virtual clock; `None` for indefinite sessions
    fn remaining_ms(&self, state: &LoopState) -> Option<u64> {
        if state.total_seconds == 0 {
            return None;
        }
        Some((u64::from(state.total_seconds) * 1000).saturating_sub(self.clock.elapsed_ms()))
    }

    fn arm_fadeout(this: &Arc<Self>, state: &mut LoopState) {
        let total_ms = u64::from(state.total_seconds) * 1000;
        let fade_ms = u64::from(fadeout_seconds(state.total_seconds)) * 1000;
        let generation = state.generation;

        match this.clock.delay_until(total_ms.saturating_sub(fade_ms)) {
            Some(delay) => {
                let weak = Arc::downgrade(this);
                state.fadeout_timer = Some(this.loader.scheduler().schedule(
                    delay,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            let mut state = inner.state.lock();
                            if state.generation == generation {
                                state.fadeout_timer = None;
                                Inner::begin_fadeout(&inner, &mut state, Duration::from_millis(fade_ms));
                            }
                        }
                    }),
                ));
            }
            None => {
                // Already inside the fade window: fade over whatever is left
                let remaining = total_ms.saturating_sub(this.clock.elapsed_ms());
                Inner::begin_fadeout(this, state, Duration::from_millis(remaining));
            }
        }
    }

    fn attach_current(this: &Arc<Self>, generation: u64, result: LoadResult) {
        let mut state = this.state.lock();
        if state.generation != generation || state.phase != LoopPhase::Loading {
            return;
        }

        match result {
            Ok(handle) => {
                let mut lane = Lane { handle, gain: 1.0 };
                this.apply_volume(state.multiplier, &mut lane);
                lane.handle.play();
                state.clip_started_at = this.loader.scheduler().now();
                state.current = Some(lane);
                state.phase = LoopPhase::Playing;
                Self::arm_crossfade(this, &mut state);
            }
            Err(e) => {
                tracing::warn!("Ambiance {} unavailable, continuing without it: {}", state.sound, e);
                state.phase = LoopPhase::Finished;
                state.cancel_timers();
                let sound = state.sound;
                drop(state);
                this.bus.publish(SessionEvent::AmbianceUnavailable {
                    sound,
                    message: e.to_string(),
                });
            }
        }
    }

    /// Schedule the next crossfade if the loop must outlive the current clip
    fn arm_crossfade(this: &Arc<Self>, state: &mut LoopState) {
        let Some(lane) = state.current.as_ref() else {
            return;
        };
        let clip = Self::clip_length(state, lane);
        let window = Self::window_for(state.sound, clip);

        let now = this.loader.scheduler().now();
        let clip_left = (state.clip_started_at + clip).saturating_sub(now);
        let needed = match this.remaining_ms(state) {
            None => true,
            Some(remaining) => (clip_left.as_millis() as u64) < remaining,
        };
        if !needed {
            tracing::debug!("Ambiance clip outlasts the session; no crossfade");
            return;
        }

        let delay = clip_left.saturating_sub(window);
        let generation = state.generation;
        let weak = Arc::downgrade(this);
        state.crossfade_timer = Some(this.loader.scheduler().schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::begin_crossfade(&inner, generation);
                }
            }),
        ));
    }

    fn begin_crossfade(this: &Arc<Self>, generation: u64) {
        let sound = {
            let mut state = this.state.lock();
            if state.generation != generation || state.phase != LoopPhase::Playing {
                return;
            }
            state.crossfade_timer = None;
            state.phase = LoopPhase::LoadingNext;
            state.sound
        };

        tracing::debug!("Crossfading ambiance {}", sound);

        let weak = Arc::downgrade(this);
        this.loader
            .load_async(AudioSourceType::Ambiance, sound.asset_name(), move |result| {
                if let Some(inner) = weak.upgrade() {
                    Inner::attach_next(&inner, generation, result);
                }
            });
    }

    fn attach_next(this: &Arc<Self>, generation: u64, result: LoadResult) {
        let mut state = this.state.lock();
        if state.generation != generation || state.phase != LoopPhase::LoadingNext {
            return;
        }

        match result {
            Ok(handle) => {
                let mut lane = Lane { handle, gain: 0.0 };
                this.apply_volume(state.multiplier, &mut lane);
                lane.handle.play();
                state.next_started_at = this.loader.scheduler().now();
                state.next = Some(lane);

                let clip = state
                    .current
                    .as_ref()
                    .map(|lane| Self::clip_length(&state, lane))
                    .unwrap_or_else(|| state.sound.authored_length());
                let steps = steps_for(Self::window_for(state.sound, clip), AMBIANCE_TICK);
                state.phase = LoopPhase::Crossfading { step: 0, steps };
                state.tick_timer = Some(Self::schedule_tick(this, generation));
            }
            Err(e) => {
                // Let the current clip play out; the loop ends with it
                tracing::warn!("Could not load next ambiance clip: {}", e);
                state.phase = LoopPhase::Playing;
            }
        }
    }

    fn schedule_tick(this: &Arc<Self>, generation: u64) -> TimerHandle {
        let weak = Arc::downgrade(this);
        this.loader.scheduler().schedule(
            AMBIANCE_TICK,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::tick(&inner, generation);
                }
            }),
        )
    }

    fn tick(this: &Arc<Self>, generation: u64) {
        let released = {
            let mut state = this.state.lock();
            if state.generation != generation {
                return;
            }
            state.tick_timer = None;

            let phase = state.phase;
            match phase {
                LoopPhase::Crossfading { step, steps } => {
                    Self::crossfade_step(this, &mut state, step + 1, steps)
                }
                LoopPhase::FadingOut { step, steps, from } => {
                    Self::fadeout_step(this, &mut state, step + 1, steps, from)
                }
                _ => Vec::new(),
            }
        };

        for mut lane in released {
            lane.handle.release();
        }
    }

    fn crossfade_step(this: &Arc<Self>, state: &mut LoopState, step: u32, steps: u32) -> Vec<Lane> {
        let progress = (step as f32 / steps as f32).min(1.0);
        if let Some(lane) = state.current.as_mut() {
            lane.gain = 1.0 - progress;
        }
        if let Some(lane) = state.next.as_mut() {
            lane.gain = progress;
        }

        if step < steps {
            this.apply_all(state);
            state.phase = LoopPhase::Crossfading { step, steps };
            state.tick_timer = Some(Self::schedule_tick(this, state.generation));
            return Vec::new();
        }

        // Replacement is already playing; retire the old handle
        let old = state.current.take();
        state.current = state.next.take();
        state.clip_started_at = state.next_started_at;
        this.apply_all(state);
        state.phase = LoopPhase::Playing;
        Self::arm_crossfade(this, state);

        old.into_iter().collect()
    }

    fn begin_fadeout(this: &Arc<Self>, state: &mut LoopState, window: Duration) {
        if let Some(timer) = state.crossfade_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = state.tick_timer.take() {
            timer.cancel();
        }

        let from = [
            state.current.as_ref().map(|lane| lane.gain).unwrap_or(0.0),
            state.next.as_ref().map(|lane| lane.gain).unwrap_or(0.0),
        ];

        if state.current.is_none() && state.next.is_none() {
            // Nothing audible yet; any pending load is dropped on arrival
            state.phase = LoopPhase::Finished;
            return;
        }

        let steps = steps_for(window, AMBIANCE_TICK);
        tracing::info!("Fading out ambiance over {:.1}s", window.as_secs_f32());
        state.phase = LoopPhase::FadingOut { step: 0, steps, from };
        state.tick_timer = Some(Self::schedule_tick(this, state.generation));
    }

    fn fadeout_step(
        this: &Arc<Self>,
        state: &mut LoopState,
        step: u32,
        steps: u32,
        from: [f32; 2],
    ) -> Vec<Lane> {
        let remaining = 1.0 - (step as f32 / steps as f32).min(1.0);
        if let Some(lane) = state.current.as_mut() {
            lane.gain = from[0] * remaining;
        }
        if let Some(lane) = state.next.as_mut() {
            lane.gain = from[1] * remaining;
        }
        this.apply_all(state);

        if step < steps {
            state.phase = LoopPhase::FadingOut { step, steps, from };
            state.tick_timer = Some(Self::schedule_tick(this, state.generation));
            return Vec::new();
        }

        tracing::debug!("Ambiance fade-out complete");
        state.phase = LoopPhase::Finished;
        state.cancel_timers();
        state.take_lanes()
    }
}

impl DuckListener for Inner {
    fn duck_multiplier_changed(&self, multiplier: f32) {
        let mut state = self.state.lock();
        state.multiplier = multiplier;
        self.apply_all(&mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PassthroughResolver;
    use crate::audio_system::ducking::UNDUCK_TARGET;
    use crate::audio_system::RecordingBackend;
    use crate::scheduling::ManualScheduler;

    struct Fixture {
        scheduler: Arc<ManualScheduler>,
        backend: RecordingBackend,
        clock: Arc<VirtualClock>,
        ducking: DuckingCoordinator,
        ambiance: AmbianceLoopController,
        events: crossbeam_channel::Receiver<SessionEvent>,
    }

    fn setup(clip: Duration) -> Fixture {
        let scheduler = Arc::new(ManualScheduler::new());
        let backend = RecordingBackend::new(scheduler.clone());
        backend.set_clip_length("ambiance_", clip);
        backend.set_clip_length("silence", Duration::from_secs(10));
        let loader = ClipLoader::new(
            scheduler.clone(),
            Arc::new(backend.clone()),
            Arc::new(PassthroughResolver::new("/sounds")),
        );
        let bus = EventBus::new();
        let (events, _id) = bus.subscribe();
        let clock = Arc::new(VirtualClock::new(scheduler.clone()));
        let ducking = DuckingCoordinator::new(scheduler.clone(), bus.clone());
        let ambiance =
            AmbianceLoopController::new(loader, clock.clone(), ducking.clone(), bus, 1.0, 1.0);
        Fixture {
            scheduler,
            backend,
            clock,
            ducking,
            ambiance,
            events,
        }
    }

    #[test]
    fn test_start_plays_at_base_times_multiplier() {
        let f = setup(Duration::from_secs(120));
        f.ambiance.start(AmbianceSound::Rain, 600);
        f.scheduler.advance(Duration::ZERO);

        assert_eq!(f.ambiance.phase(), LoopPhase::Playing);
        let record = &f.backend.players_matching("rain")[0];
        assert_eq!(record.play_count, 1);
        assert_eq!(record.volume, UNDUCK_TARGET);
    }

    #[test]
    fn test_crossfade_keeps_volume_in_band() {
        let f = setup(Duration::from_secs(60));
        f.ambiance.start(AmbianceSound::Ocean, 0);
        f.scheduler.advance(Duration::ZERO);

        // Crossfade begins at clip - window = 52s
        f.scheduler.advance_secs(52);
        assert_eq!(f.ambiance.live_handles(), 2);

        for _ in 0..79 {
            f.scheduler.advance(AMBIANCE_TICK);
            let players = f.backend.live_players();
            assert_eq!(players.len(), 2);
            let sum: f32 = players.iter().map(|p| p.volume).sum();
            assert!((sum - UNDUCK_TARGET).abs() < 0.01, "sum {}", sum);
        }

        f.scheduler.advance(AMBIANCE_TICK);
        let players = f.backend.players_matching("ocean");
        assert!(players[0].is_released());
        assert!(players[1].started_at.unwrap() <= players[0].released_at.unwrap());
        let live = f.backend.live_players();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].volume, UNDUCK_TARGET);
        assert_eq!(f.ambiance.phase(), LoopPhase::Playing);
    }

    #[test]
    fn test_indefinite_session_keeps_looping() {
        let f = setup(Duration::from_secs(30));
        f.ambiance.start(AmbianceSound::Stream, 0);
        f.scheduler.advance_secs(300);

        assert!(f.backend.players_matching("stream").len() >= 10);
        assert_eq!(f.backend.live_players().len(), 1);
    }

    #[test]
    fn test_no_crossfade_when_clip_outlasts_session() {
        let f = setup(Duration::from_secs(120));
        f.ambiance.start(AmbianceSound::Forest, 60);
        f.scheduler.advance_secs(30);

        assert_eq!(f.backend.players_matching("forest").len(), 1);
    }

    #[test]
    fn test_fadeout_near_end() {
        let f = setup(Duration::from_secs(120));
        f.ambiance.start(AmbianceSound::Rain, 300);

        // 300s session: fade-out over 30s starting at 270s
        f.scheduler.advance_secs(269);
        assert_eq!(f.ambiance.phase(), LoopPhase::Playing);

        f.scheduler.advance_secs(15);
        assert!(matches!(f.ambiance.phase(), LoopPhase::FadingOut { .. }));
        let live = f.backend.live_players();
        assert!(live.iter().all(|p| p.volume < UNDUCK_TARGET));

        f.scheduler.advance_secs(16);
        assert_eq!(f.ambiance.phase(), LoopPhase::Finished);
        assert!(f.backend.live_players().is_empty());
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_skip_into_fade_window_fades_over_remainder() {
        let f = setup(Duration::from_secs(120));
        f.ambiance.start(AmbianceSound::Wind, 600);
        f.scheduler.advance_secs(1);

        f.clock.skip(590);
        f.ambiance.resync_after_skip();
        assert!(matches!(f.ambiance.phase(), LoopPhase::FadingOut { .. }));

        f.scheduler.advance_secs(9);
        assert_eq!(f.ambiance.phase(), LoopPhase::Finished);
        assert!(f.backend.live_players().is_empty());
    }

    #[test]
    fn test_silence_mode_loops_silent_clip() {
        let f = setup(Duration::from_secs(120));
        f.ambiance.start(AmbianceSound::None, 0);
        f.scheduler.advance_secs(25);

        let silent = f.backend.players_matching("silence");
        assert!(silent.len() >= 3);
        assert_eq!(f.backend.live_players().len(), 1);
    }

    #[test]
    fn test_ducking_lowers_applied_volume() {
        let f = setup(Duration::from_secs(120));
        f.ambiance.start(AmbianceSound::Fireplace, 600);
        f.scheduler.advance(Duration::ZERO);

        f.ducking.duck();
        f.scheduler.advance_secs(1);
        let record = &f.backend.players_matching("fireplace")[0];
        assert_eq!(record.volume, 0.25);
        assert!(record.volume_history.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_load_failure_reports_and_continues() {
        let f = setup(Duration::from_secs(120));
        f.backend.fail_loads_containing("night");
        f.ambiance.start(AmbianceSound::Night, 600);
        f.scheduler.advance(Duration::ZERO);

        assert_eq!(f.ambiance.phase(), LoopPhase::Finished);
        assert!(f
            .events
            .try_iter()
            .any(|e| matches!(e, SessionEvent::AmbianceUnavailable { .. })));
    }

    #[test]
    fn test_stop_cancels_then_releases() {
        let f = setup(Duration::from_secs(20));
        f.ambiance.start(AmbianceSound::Ocean, 0);
        f.scheduler.advance_secs(14);
        assert_eq!(f.ambiance.live_handles(), 2);

        f.ambiance.stop();
        f.ambiance.stop();

        assert_eq!(f.scheduler.pending(), 0);
        assert!(f.backend.live_players().is_empty());
        assert!(f.backend.players().iter().all(|p| p.release_count == 1));
        assert_eq!(f.ambiance.phase(), LoopPhase::Idle);
    }
}
