/// Guidance cue player
///
/// One voice clip at a time. Every attempt ducks the ambiance before loading
/// and unducks exactly once when the attempt ends: on completion, on a load
/// failure, on a skip or on stop.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Cue, CuePlayer, PLAYBACK_POLL_INTERVAL};
use crate::audio_system::loader::{ClipLoader, LoadResult};
use crate::audio_system::{AudioPlayerHandle, AudioSourceType, DuckingCoordinator};
use crate::messaging::{EventBus, SessionEvent};
use crate::scheduling::TimerHandle;

struct CueAttempt {
    id: u64,
    cue: Cue,
    ducked: bool,
    handle: Option<AudioPlayerHandle>,
    poll: Option<TimerHandle>,
}

#[derive(Default)]
struct GuidanceState {
    next_attempt: u64,
    current: Option<CueAttempt>,
}

struct Inner {
    loader: ClipLoader,
    ducking: DuckingCoordinator,
    bus: EventBus,
    volume: f32,
    state: Mutex<GuidanceState>,
}

pub struct GuidancePlayer {
    inner: Arc<Inner>,
}

impl GuidancePlayer {
    pub fn new(loader: ClipLoader, ducking: DuckingCoordinator, bus: EventBus, volume: f32) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                ducking,
                bus,
                volume: volume.clamp(0.0, 1.0),
                state: Mutex::new(GuidanceState::default()),
            }),
        }
    }

    /// Clip currently loading or playing
    pub fn current_clip(&self) -> Option<Cue> {
        self.inner.state.lock().current.as_ref().map(|a| a.cue.clone())
    }
}

impl CuePlayer for GuidancePlayer {
    fn play(&self, cue: &Cue) {
        if !matches!(cue, Cue::Guidance { .. }) {
            tracing::warn!("Guidance player asked to play {}", cue);
            return;
        }

        let id = {
            let mut state = self.inner.state.lock();
            if let Some(previous) = state.current.take() {
                tracing::debug!("{} interrupted by {}", previous.cue, cue);
                self.inner.finish(previous);
            }

            state.next_attempt += 1;
            let id = state.next_attempt;
            self.inner.ducking.duck();
            state.current = Some(CueAttempt {
                id,
                cue: cue.clone(),
                ducked: true,
                handle: None,
                poll: None,
            });
            id
        };

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .loader
            .load_async(AudioSourceType::Guidance, cue.asset_name(), move |result| {
                if let Some(inner) = weak.upgrade() {
                    Inner::attach(&inner, id, result);
                }
            });
    }

    fn stop(&self) {
        let current = self.inner.state.lock().current.take();
        if let Some(attempt) = current {
            tracing::debug!("Stopping {}", attempt.cue);
            self.inner.finish(attempt);
        }
    }

    fn interrupted_by_skip(&self) -> bool {
        true
    }
}

impl Inner {
    /// End an attempt: cancel its poll, release its handle, pair its duck
    fn finish(&self, mut attempt: CueAttempt) {
        if let Some(poll) = attempt.poll.take() {
            poll.cancel();
        }
        if let Some(mut handle) = attempt.handle.take() {
            handle.release();
        }
        if attempt.ducked {
            self.ducking.unduck();
        }
    }

    fn attach(this: &Arc<Self>, id: u64, result: LoadResult) {
        let mut state = this.state.lock();
        let is_current = matches!(&state.current, Some(attempt) if attempt.id == id);
        if !is_current {
            // Stale load; the attempt already ended and unducked
            return;
        }

        match result {
            Ok(mut handle) => {
                handle.set_volume(this.volume);
                handle.play();
                let poll = Self::schedule_poll(this, id);
                if let Some(attempt) = state.current.as_mut() {
                    attempt.handle = Some(handle);
                    attempt.poll = Some(poll);
                }
            }
            Err(e) => {
                let Some(attempt) = state.current.take() else {
                    return;
                };
                drop(state);

                tracing::warn!("Guidance {} could not be played: {}", attempt.cue, e);
                let cue = attempt.cue.clone();
                this.finish(attempt);
                this.bus.publish(SessionEvent::CueFailed {
                    cue,
                    message: e.to_string(),
                });
            }
        }
    }

    fn schedule_poll(this: &Arc<Self>, id: u64) -> TimerHandle {
        let weak = Arc::downgrade(this);
        this.loader.scheduler().schedule(
            PLAYBACK_POLL_INTERVAL,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::poll(&inner, id);
                }
            }),
        )
    }

    fn poll(this: &Arc<Self>, id: u64) {
        let mut state = this.state.lock();
        let finished = match state.current.as_ref() {
            Some(attempt) if attempt.id == id => attempt
                .handle
                .as_ref()
                .map(|handle| handle.is_finished())
                .unwrap_or(false),
            _ => return,
        };

        if finished {
            if let Some(attempt) = state.current.take() {
                tracing::debug!("{} finished", attempt.cue);
                this.finish(attempt);
            }
        } else {
            let poll = Self::schedule_poll(this, id);
            if let Some(attempt) = state.current.as_mut() {
                attempt.poll = Some(poll);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PassthroughResolver;
    use crate::audio_system::ducking::{DUCK_TARGET, UNDUCK_TARGET};
    use crate::audio_system::RecordingBackend;
    use crate::scheduling::ManualScheduler;
    use std::time::Duration;

    struct Fixture {
        scheduler: Arc<ManualScheduler>,
        backend: RecordingBackend,
        resolver: Arc<PassthroughResolver>,
        ducking: DuckingCoordinator,
        player: GuidancePlayer,
        events: crossbeam_channel::Receiver<SessionEvent>,
    }

    fn setup() -> Fixture {
        let scheduler = Arc::new(ManualScheduler::new());
        let backend = RecordingBackend::new(scheduler.clone());
        backend.set_clip_length("guide_", Duration::from_secs(20));
        let resolver = Arc::new(PassthroughResolver::new("/sounds"));
        let bus = EventBus::new();
        let (events, _id) = bus.subscribe();
        let loader = ClipLoader::new(scheduler.clone(), Arc::new(backend.clone()), resolver.clone());
        let ducking = DuckingCoordinator::new(scheduler.clone(), bus.clone());
        let player = GuidancePlayer::new(loader, ducking.clone(), bus, 1.0);
        Fixture {
            scheduler,
            backend,
            resolver,
            ducking,
            player,
            events,
        }
    }

    fn duck_events(events: &crossbeam_channel::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        events
            .try_iter()
            .filter(|e| matches!(e, SessionEvent::Ducked | SessionEvent::Unducked))
            .collect()
    }

    #[test]
    fn test_clip_ducks_then_unducks_on_completion() {
        let f = setup();

        f.player.play(&Cue::guidance("guide_breath"));
        f.scheduler.advance_secs(5);
        assert_eq!(f.ducking.multiplier(), DUCK_TARGET);
        assert_eq!(f.backend.players_matching("guide_breath")[0].play_count, 1);

        f.scheduler.advance_secs(20);
        assert!(f.backend.players_matching("guide_breath")[0].is_released());
        assert_eq!(f.ducking.multiplier(), UNDUCK_TARGET);
        assert_eq!(
            duck_events(&f.events),
            vec![SessionEvent::Ducked, SessionEvent::Unducked]
        );
        assert!(f.player.current_clip().is_none());
    }

    #[test]
    fn test_resolution_failure_still_unducks() {
        let f = setup();
        f.resolver.fail("guide_body.mp3");

        f.player.play(&Cue::guidance("guide_body"));
        f.scheduler.advance_secs(2);

        assert_eq!(f.ducking.multiplier(), UNDUCK_TARGET);
        assert!(f.backend.players().is_empty());

        let events: Vec<SessionEvent> = f.events.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::CueFailed { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SessionEvent::Unducked))
                .count(),
            1
        );
    }

    #[test]
    fn test_decode_failure_still_unducks() {
        let f = setup();
        f.backend.fail_loads_containing("guide_wander");

        f.player.play(&Cue::guidance("guide_wander"));
        f.scheduler.advance_secs(2);

        assert_eq!(f.ducking.multiplier(), UNDUCK_TARGET);
        assert_eq!(duck_events(&f.events).len(), 2);
    }

    #[test]
    fn test_new_cue_interrupts_previous() {
        let f = setup();

        f.player.play(&Cue::guidance("guide_arrive"));
        f.scheduler.advance_secs(1);
        f.player.play(&Cue::guidance("guide_breath"));
        f.scheduler.advance(Duration::ZERO);

        assert!(f.backend.players_matching("guide_arrive")[0].is_released());
        assert!(!f.backend.players_matching("guide_breath")[0].is_released());
        assert_eq!(f.player.current_clip(), Some(Cue::guidance("guide_breath")));

        // Two attempts, two ducks, one unduck so far
        let events = duck_events(&f.events);
        assert_eq!(events.iter().filter(|e| **e == SessionEvent::Ducked).count(), 2);
        assert_eq!(events.iter().filter(|e| **e == SessionEvent::Unducked).count(), 1);
    }

    #[test]
    fn test_stop_before_load_completes_drops_handle() {
        let f = setup();

        f.player.play(&Cue::guidance("guide_close"));
        f.player.stop();
        f.player.stop();
        f.scheduler.advance(Duration::ZERO);

        let records = f.backend.players_matching("guide_close");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].play_count, 0);
        assert_eq!(records[0].release_count, 1);
        assert_eq!(duck_events(&f.events).len(), 2);
    }
}
