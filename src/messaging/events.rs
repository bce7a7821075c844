/// Event types for the engine
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers; a haptics or visual layer listens
/// for `Ducked` / `Unducked` and `SessionCompleted`.
use crate::audio_system::AmbianceSound;
use crate::config::SessionConfig;
use crate::cues::Cue;
use crate::state::SessionState;

/// Engine events
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Orchestrator state changed
    StateChanged {
        old_state: SessionState,
        new_state: SessionState,
    },

    /// Session components are running
    SessionStarted { config: SessionConfig },

    /// A scheduled cue fired and was handed to its player
    CueFired {
        schedule: &'static str,
        offset_seconds: u32,
        cue: Cue,
    },

    /// A cue was passed over by a skip and will not play
    CueSkipped {
        schedule: &'static str,
        offset_seconds: u32,
        cue: Cue,
    },

    /// A cue could not be played
    CueFailed { cue: Cue, message: String },

    /// Ambiance is being lowered for a cue
    Ducked,

    /// Ambiance is returning to its normal level
    Unducked,

    /// The ambiance layer could not be played; the session continues without it
    AmbianceUnavailable { sound: AmbianceSound, message: String },

    /// The virtual clock jumped forward
    SkippedForward { seconds: u32, elapsed_ms: u64 },

    /// The session reached its natural end
    SessionCompleted,

    /// Teardown finished
    SessionStopped { completed: bool },
}

impl SessionEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SessionEvent::StateChanged { new_state, .. } => {
                format!("Session state: {}", new_state.description())
            }
            SessionEvent::SessionStarted { config } => format!(
                "Session started: {} for {} min, guidance level {}",
                config.sound,
                config.duration_minutes,
                u8::from(config.guidance_level)
            ),
            SessionEvent::CueFired {
                schedule,
                offset_seconds,
                cue,
            } => format!("{} cue at {}s: {}", schedule, offset_seconds, cue),
            SessionEvent::CueSkipped {
                schedule,
                offset_seconds,
                cue,
            } => format!("{} cue at {}s skipped: {}", schedule, offset_seconds, cue),
            SessionEvent::CueFailed { cue, message } => {
                format!("Cue {} failed: {}", cue, message)
            }
            SessionEvent::Ducked => "Ambiance ducked".to_string(),
            SessionEvent::Unducked => "Ambiance restored".to_string(),
            SessionEvent::AmbianceUnavailable { sound, message } => {
                format!("Ambiance {} unavailable: {}", sound, message)
            }
            SessionEvent::SkippedForward { seconds, elapsed_ms } => {
                format!("Skipped {}s, now at {}s", seconds, elapsed_ms / 1000)
            }
            SessionEvent::SessionCompleted => "Session completed".to_string(),
            SessionEvent::SessionStopped { completed } => {
                if *completed {
                    "Session finished".to_string()
                } else {
                    "Session stopped".to_string()
                }
            }
        }
    }
}
