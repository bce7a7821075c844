/// Cue scheduling module
///
/// Bells and spoken guidance share one scheduler; only the player differs.
///
/// ```text
/// CueScheduler<BellPlayer>      ─┐
///                                ├── VirtualClock (shared)
/// CueScheduler<GuidancePlayer>  ─┘
///        │
///        └── GuidancePlayer ── DuckingCoordinator ── AmbianceLoopController
/// ```
use std::fmt;
use std::time::Duration;

pub mod bell;
pub mod guidance;
pub mod schedule;
pub mod scheduler;

pub use bell::BellPlayer;
pub use guidance::GuidancePlayer;
pub use scheduler::{CuePlayer, CueScheduler};

/// How often a playing cue is checked for completion
pub const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a schedule entry plays
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cue {
    /// Bell strike, optionally struck twice
    Bell { double: bool },

    /// Named voice clip
    Guidance { clip: String },
}

impl Cue {
    pub fn guidance(clip: &str) -> Self {
        Cue::Guidance {
            clip: clip.to_string(),
        }
    }

    /// Asset name handed to the resolver
    pub fn asset_name(&self) -> String {
        match self {
            Cue::Bell { .. } => crate::audio_system::source::BELL_ASSET.to_string(),
            Cue::Guidance { clip } => format!("{}.mp3", clip),
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cue::Bell { double: false } => write!(f, "bell"),
            Cue::Bell { double: true } => write!(f, "double bell"),
            Cue::Guidance { clip } => write!(f, "guidance '{}'", clip),
        }
    }
}

/// One scheduled cue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueScheduleEntry {
    pub offset_seconds: u32,
    pub cue: Cue,
    pub fired: bool,
}

impl CueScheduleEntry {
    pub fn new(offset_seconds: u32, cue: Cue) -> Self {
        Self {
            offset_seconds,
            cue,
            fired: false,
        }
    }

    pub fn offset_ms(&self) -> u64 {
        u64::from(self.offset_seconds) * 1000
    }
}
