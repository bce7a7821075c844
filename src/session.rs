/// Session orchestrator
///
/// Owns one session's worth of components and drives the lifecycle
/// `Idle → Starting → Active → Stopping → Idle`. Completion is reported with
/// `SessionCompleted` and then goes through the ordinary teardown path.
///
/// Lock order: engine runtime, then components (cue schedulers, players),
/// then the ducking coordinator, then the ambiance loop.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::assets::AssetResolver;
use crate::audio_system::{
    AmbianceLoopController, AmbianceSound, AudioBackend, ClipLoader, DuckState,
    DuckingCoordinator, LoopPhase,
};
use crate::config::{EngineSettings, SessionConfig};
use crate::cues::schedule::{bell_schedule, guidance_schedule, prefetch_assets};
use crate::cues::{BellPlayer, CueScheduleEntry, CueScheduler, GuidancePlayer};
use crate::error::SessionError;
use crate::messaging::{EventBus, SessionEvent};
use crate::scheduling::{Scheduler, TimerHandle, VirtualClock};
use crate::state::{SessionState, SessionStateMachine};

/// Guidance clips resolved before the session goes active
const GUIDANCE_PREFETCH: usize = 2;

#[derive(Default)]
struct Runtime {
    machine: SessionStateMachine,
    generation: u64,
    config: Option<SessionConfig>,
    completion_timer: Option<TimerHandle>,
    disposed: bool,
}

struct EngineInner {
    scheduler: Arc<dyn Scheduler>,
    loader: ClipLoader,
    bus: EventBus,
    clock: Arc<VirtualClock>,
    ducking: DuckingCoordinator,
    ambiance: AmbianceLoopController,
    bells: CueScheduler<BellPlayer>,
    guidance: CueScheduler<GuidancePlayer>,
    runtime: Mutex<Runtime>,
}

/// One engine per session host. Call [`SessionEngine::dispose`] (or drop it)
/// when the host goes away.
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        backend: Arc<dyn AudioBackend>,
        resolver: Arc<dyn AssetResolver>,
        settings: &EngineSettings,
        bus: EventBus,
    ) -> Self {
        let loader = ClipLoader::new(Arc::clone(&scheduler), backend, resolver);
        let clock = Arc::new(VirtualClock::new(Arc::clone(&scheduler)));
        let ducking = DuckingCoordinator::new(Arc::clone(&scheduler), bus.clone());

        let ambiance = AmbianceLoopController::new(
            loader.clone(),
            Arc::clone(&clock),
            ducking.clone(),
            bus.clone(),
            settings.ambiance_volume,
            settings.preview_volume,
        );

        let bells = CueScheduler::new(
            "bells",
            Arc::clone(&scheduler),
            Arc::clone(&clock),
            Arc::new(BellPlayer::new(loader.clone(), bus.clone(), settings.bell_volume)),
            bus.clone(),
        );

        let guidance = CueScheduler::new(
            "guidance",
            Arc::clone(&scheduler),
            Arc::clone(&clock),
            Arc::new(GuidancePlayer::new(
                loader.clone(),
                ducking.clone(),
                bus.clone(),
                settings.guidance_volume,
            )),
            bus.clone(),
        );

        Self {
            inner: Arc::new(EngineInner {
                scheduler,
                loader,
                bus,
                clock,
                ducking,
                ambiance,
                bells,
                guidance,
                runtime: Mutex::new(Runtime::default()),
            }),
        }
    }

    /// Start a session, replacing any session already running
    pub fn start_session(&self, config: SessionConfig) -> Result<(), SessionError> {
        let previous = {
            let runtime = self.inner.runtime.lock();
            if runtime.disposed {
                return Err(SessionError::Disposed);
            }
            runtime.machine.state()
        };

        match previous {
            SessionState::Stopping => return Err(SessionError::InTransition),
            SessionState::Starting | SessionState::Active { .. } => {
                tracing::info!("Replacing running session");
                EngineInner::teardown(&self.inner, false, None);
            }
            SessionState::Idle => {}
        }

        let (generation, bells, guidance) = {
            let mut runtime = self.inner.runtime.lock();
            if runtime.disposed {
                return Err(SessionError::Disposed);
            }
            runtime
                .machine
                .start()
                .map_err(|_| SessionError::InTransition)?;
            runtime.generation += 1;
            runtime.config = Some(config.clone());
            self.inner
                .publish_transition(SessionState::Idle, SessionState::Starting);
            (runtime.generation, bell_schedule(&config), guidance_schedule(&config))
        };

        tracing::info!(
            "Starting session: {} for {} min, guidance level {}, {} bell and {} guidance cues",
            config.sound,
            config.duration_minutes,
            u8::from(config.guidance_level),
            bells.len(),
            guidance.len()
        );

        let assets = prefetch_assets(&bells, &guidance, GUIDANCE_PREFETCH);
        let weak = Arc::downgrade(&self.inner);
        self.inner.loader.prefetch(assets, move || {
            if let Some(inner) = weak.upgrade() {
                EngineInner::activate(&inner, generation, config, bells, guidance);
            }
        });

        Ok(())
    }

    /// Stop the running session. Stopping an idle engine is a no-op.
    pub fn stop_session(&self) {
        EngineInner::teardown(&self.inner, false, None);
    }

    /// Jump the session forward by `seconds`
    pub fn skip_forward(&self, seconds: u32) -> Result<(), SessionError> {
        let (complete_now, generation) = {
            let mut runtime = self.inner.runtime.lock();
            if runtime.disposed {
                return Err(SessionError::Disposed);
            }
            let state = runtime.machine.state();
            if state.is_transitioning() {
                return Err(SessionError::InTransition);
            }
            if !state.is_active() {
                return Err(SessionError::NotActive);
            }

            self.inner.clock.skip(seconds);
            self.inner.bells.resync_after_skip();
            self.inner.guidance.resync_after_skip();
            self.inner.ambiance.resync_after_skip();

            let elapsed_ms = self.inner.clock.elapsed_ms();
            tracing::info!("Skipped forward {}s, now at {}ms", seconds, elapsed_ms);
            self.inner
                .bus
                .publish(SessionEvent::SkippedForward { seconds, elapsed_ms });

            let complete_now = EngineInner::arm_completion(&self.inner, &mut runtime);
            (complete_now, runtime.generation)
        };

        if complete_now {
            EngineInner::teardown(&self.inner, true, Some(generation));
        }
        Ok(())
    }

    /// Play a short sample of `sound`, with or without a session running
    pub fn preview_sound(&self, sound: AmbianceSound) -> Result<(), SessionError> {
        if self.inner.runtime.lock().disposed {
            return Err(SessionError::Disposed);
        }
        self.inner.ambiance.preview(sound);
        Ok(())
    }

    /// Tear everything down for good. Idempotent.
    pub fn dispose(&self) {
        EngineInner::teardown(&self.inner, false, None);
        self.inner.ambiance.stop_preview();

        let mut runtime = self.inner.runtime.lock();
        if !runtime.disposed {
            runtime.disposed = true;
            tracing::debug!("Session engine disposed");
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.runtime.lock().machine.state()
    }

    pub fn current_config(&self) -> Option<SessionConfig> {
        self.inner.runtime.lock().config.clone()
    }

    pub fn virtual_elapsed_ms(&self) -> u64 {
        self.inner.clock.elapsed_ms()
    }

    pub fn bell_entries(&self) -> Vec<CueScheduleEntry> {
        self.inner.bells.entries()
    }

    pub fn guidance_entries(&self) -> Vec<CueScheduleEntry> {
        self.inner.guidance.entries()
    }

    pub fn duck_state(&self) -> DuckState {
        self.inner.ducking.state()
    }

    pub fn ambiance_phase(&self) -> LoopPhase {
        self.inner.ambiance.phase()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl EngineInner {
    fn publish_transition(&self, old_state: SessionState, new_state: SessionState) {
        self.bus.publish(SessionEvent::StateChanged {
            old_state,
            new_state,
        });
    }

    /// Prefetch finished: bring every component up
    fn activate(
        this: &Arc<Self>,
        generation: u64,
        config: SessionConfig,
        bells: Vec<CueScheduleEntry>,
        guidance: Vec<CueScheduleEntry>,
    ) {
        let mut runtime = this.runtime.lock();
        if runtime.generation != generation || runtime.machine.state() != SessionState::Starting {
            tracing::debug!("Discarding stale session activation");
            return;
        }

        this.clock.restart();
        this.ducking.reset();

        let since = this.scheduler.now();
        if let Err(e) = runtime.machine.mark_active(since) {
            tracing::warn!("Session could not go active: {}", e);
            return;
        }
        let active = runtime.machine.state();
        this.publish_transition(SessionState::Starting, active);
        this.bus.publish(SessionEvent::SessionStarted {
            config: config.clone(),
        });

        this.ambiance.start(config.sound, config.total_seconds());
        this.bells.start(bells);
        this.guidance.start(guidance);

        if !config.is_indefinite() {
            // Freshly restarted clock, so the end is always in the future
            let _ = Self::arm_completion(this, &mut runtime);
        }

        tracing::info!("Session active");
    }

    /// Schedule the completion timer; `true` when the end has already passed
    fn arm_completion(this: &Arc<Self>, runtime: &mut Runtime) -> bool {
        if let Some(timer) = runtime.completion_timer.take() {
            timer.cancel();
        }
        let Some(config) = runtime.config.as_ref() else {
            return false;
        };
        if config.is_indefinite() {
            return false;
        }

        let total_ms = u64::from(config.total_seconds()) * 1000;
        match this.clock.delay_until(total_ms) {
            Some(delay) => {
                let generation = runtime.generation;
                let weak: Weak<Self> = Arc::downgrade(this);
                runtime.completion_timer = Some(this.scheduler.schedule(
                    delay,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            EngineInner::teardown(&inner, true, Some(generation));
                        }
                    }),
                ));
                false
            }
            None => true,
        }
    }

    /// Stop every component exactly once. Returns whether this call did the work.
    fn teardown(this: &Arc<Self>, completed: bool, expected: Option<u64>) -> bool {
        let mut runtime = this.runtime.lock();
        if expected.is_some_and(|generation| generation != runtime.generation) {
            return false;
        }

        let old_state = runtime.machine.state();
        if completed && !old_state.is_active() {
            return false;
        }
        if runtime.machine.stop().is_err() {
            return false;
        }

        if completed {
            tracing::info!("Session completed");
            this.bus.publish(SessionEvent::SessionCompleted);
        }
        this.publish_transition(old_state, SessionState::Stopping);

        runtime.generation += 1;
        if let Some(timer) = runtime.completion_timer.take() {
            timer.cancel();
        }

        this.bells.stop();
        this.guidance.stop();
        this.ambiance.stop();
        this.ducking.reset();

        if let Err(e) = runtime.machine.mark_idle() {
            tracing::warn!("Unexpected state after teardown: {}", e);
        }
        runtime.config = None;
        this.publish_transition(SessionState::Stopping, SessionState::Idle);
        this.bus.publish(SessionEvent::SessionStopped { completed });

        tracing::info!(
            "Session {} after {}s",
            if completed { "finished" } else { "stopped" },
            Duration::from_millis(this.clock.elapsed_ms()).as_secs()
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PassthroughResolver;
    use crate::audio_system::RecordingBackend;
    use crate::config::GuidanceLevel;
    use crate::scheduling::ManualScheduler;

    fn engine() -> (Arc<ManualScheduler>, RecordingBackend, SessionEngine) {
        let scheduler = Arc::new(ManualScheduler::new());
        let backend = RecordingBackend::new(scheduler.clone());
        let engine = SessionEngine::new(
            scheduler.clone(),
            Arc::new(backend.clone()),
            Arc::new(PassthroughResolver::new("/sounds")),
            &EngineSettings::default(),
            EventBus::new(),
        );
        (scheduler, backend, engine)
    }

    #[test]
    fn test_lifecycle_states() {
        let (scheduler, _backend, engine) = engine();
        assert_eq!(engine.state(), SessionState::Idle);

        engine.start_session(SessionConfig::default()).unwrap();
        assert_eq!(engine.state(), SessionState::Starting);

        scheduler.advance(Duration::ZERO);
        assert!(engine.state().is_active());

        engine.stop_session();
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn test_skip_requires_active_session() {
        let (_scheduler, _backend, engine) = engine();
        assert_eq!(engine.skip_forward(30), Err(SessionError::NotActive));

        engine.start_session(SessionConfig::default()).unwrap();
        assert_eq!(engine.skip_forward(30), Err(SessionError::InTransition));
    }

    #[test]
    fn test_stop_while_starting_discards_activation() {
        let (scheduler, backend, engine) = engine();
        engine.start_session(SessionConfig::default()).unwrap();
        engine.stop_session();

        scheduler.advance_secs(5);
        assert_eq!(engine.state(), SessionState::Idle);
        assert!(backend.players().is_empty());
    }

    #[test]
    fn test_restart_replaces_running_session() {
        let (scheduler, backend, engine) = engine();
        engine.start_session(SessionConfig::default()).unwrap();
        scheduler.advance_secs(30);

        let config = SessionConfig {
            sound: AmbianceSound::Rain,
            guidance_level: GuidanceLevel::Gentle,
            ..SessionConfig::default()
        };
        engine.start_session(config.clone()).unwrap();
        scheduler.advance(Duration::ZERO);

        assert!(engine.state().is_active());
        assert_eq!(engine.current_config(), Some(config));
        assert!(engine.virtual_elapsed_ms() < 1000);
        assert!(engine.bell_entries().is_empty());
        assert!(!engine.guidance_entries().is_empty());
        assert!(backend.players_matching("silence").iter().all(|p| p.is_released()));
    }

    #[test]
    fn test_oversized_duration_runs_every_component() {
        let (scheduler, backend, engine) = engine();
        let config = SessionConfig {
            duration_minutes: 80_000_000,
            ..SessionConfig::default()
        };
        engine.start_session(config).unwrap();
        scheduler.advance(Duration::ZERO);

        assert!(engine.state().is_active());
        assert_eq!(engine.ambiance_phase(), LoopPhase::Playing);
        assert!(scheduler.pending() > 0);

        engine.skip_forward(3600).unwrap();
        assert!(engine.state().is_active());

        engine.stop_session();
        assert_eq!(engine.state(), SessionState::Idle);
        assert!(backend.live_players().is_empty());
    }

    #[test]
    fn test_disposed_engine_rejects_requests() {
        let (_scheduler, _backend, engine) = engine();
        engine.dispose();
        engine.dispose();

        assert_eq!(
            engine.start_session(SessionConfig::default()),
            Err(SessionError::Disposed)
        );
        assert_eq!(
            engine.preview_sound(AmbianceSound::Rain),
            Err(SessionError::Disposed)
        );
    }
}
