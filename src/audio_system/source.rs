/// Audio source types
///
/// The sound catalog the engine knows about, plus the categories of audio that
/// can be playing at the same time.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Asset name of the generated silent clip used by silence mode
pub const SILENCE_ASSET: &str = "silence.wav";

/// Asset name of the bell strike
pub const BELL_ASSET: &str = "bell.mp3";

/// Authored length of every ambiance clip
pub const AMBIANCE_CLIP_LENGTH: Duration = Duration::from_secs(120);

/// Authored length of the silent clip
pub const SILENCE_CLIP_LENGTH: Duration = Duration::from_secs(10);

/// Overlap between two ambiance players while looping
pub const CROSSFADE_WINDOW: Duration = Duration::from_secs(8);

/// Overlap used when looping the silent clip
pub const SILENCE_CROSSFADE_WINDOW: Duration = Duration::from_secs(1);

/// Ambiance bed selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmbianceSound {
    /// No audible ambiance; a silent clip keeps the output alive
    #[default]
    None,
    Rain,
    Ocean,
    Forest,
    Stream,
    Wind,
    Fireplace,
    Night,
}

impl AmbianceSound {
    pub const ALL: [AmbianceSound; 8] = [
        AmbianceSound::None,
        AmbianceSound::Rain,
        AmbianceSound::Ocean,
        AmbianceSound::Forest,
        AmbianceSound::Stream,
        AmbianceSound::Wind,
        AmbianceSound::Fireplace,
        AmbianceSound::Night,
    ];

    pub fn is_silence(&self) -> bool {
        matches!(self, AmbianceSound::None)
    }

    pub fn id(&self) -> &'static str {
        match self {
            AmbianceSound::None => "none",
            AmbianceSound::Rain => "rain",
            AmbianceSound::Ocean => "ocean",
            AmbianceSound::Forest => "forest",
            AmbianceSound::Stream => "stream",
            AmbianceSound::Wind => "wind",
            AmbianceSound::Fireplace => "fireplace",
            AmbianceSound::Night => "night",
        }
    }

    /// Logical asset name handed to the resolver
    pub fn asset_name(&self) -> String {
        if self.is_silence() {
            SILENCE_ASSET.to_string()
        } else {
            format!("ambiance_{}.mp3", self.id())
        }
    }

    /// Clip length to assume when the file cannot be probed
    pub fn authored_length(&self) -> Duration {
        if self.is_silence() {
            SILENCE_CLIP_LENGTH
        } else {
            AMBIANCE_CLIP_LENGTH
        }
    }

    pub fn crossfade_window(&self) -> Duration {
        if self.is_silence() {
            SILENCE_CROSSFADE_WINDOW
        } else {
            CROSSFADE_WINDOW
        }
    }
}

impl fmt::Display for AmbianceSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for AmbianceSound {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AmbianceSound::ALL
            .into_iter()
            .find(|sound| sound.id() == wanted)
            .ok_or_else(|| format!("unknown sound '{}'", s))
    }
}

/// Audio layer categories that can play simultaneously
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSourceType {
    /// Looping background bed
    Ambiance,

    /// Bell strike cue
    Bell,

    /// Spoken guidance cue
    Guidance,

    /// Standalone sound sample (UI)
    Preview,
}

impl fmt::Display for AudioSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSourceType::Ambiance => write!(f, "Ambiance"),
            AudioSourceType::Bell => write!(f, "Bell"),
            AudioSourceType::Guidance => write!(f, "Guidance"),
            AudioSourceType::Preview => write!(f, "Preview"),
        }
    }
}
