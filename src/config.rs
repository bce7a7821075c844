use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio_system::AmbianceSound;
use crate::error::ConfigError;

const APP_DIR: &str = "MeditationAudio";

/// How much spoken or struck guidance a session carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum GuidanceLevel {
    /// Ambiance only
    None = 0,
    /// Interval bells, no voice
    #[default]
    BellOnly = 1,
    /// Sparse voice cues
    Gentle = 2,
    /// Continuous voice guidance
    Continuous = 3,
}

impl TryFrom<u8> for GuidanceLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GuidanceLevel::None),
            1 => Ok(GuidanceLevel::BellOnly),
            2 => Ok(GuidanceLevel::Gentle),
            3 => Ok(GuidanceLevel::Continuous),
            other => Err(format!("guidance level must be 0-3, got {}", other)),
        }
    }
}

impl From<GuidanceLevel> for u8 {
    fn from(level: GuidanceLevel) -> Self {
        level as u8
    }
}

/// Everything the caller chooses when starting a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Ambiance bed, or `none` for silence
    pub sound: AmbianceSound,

    /// Session length; 0 runs until stopped
    pub duration_minutes: u32,

    pub guidance_level: GuidanceLevel,

    /// Not read by the engine; carried in `SessionStarted` for a haptics layer
    #[serde(default)]
    pub haptics_enabled: bool,

    #[serde(default = "default_true")]
    pub bells_enabled: bool,

    /// Close silent bell-only sessions with a double strike
    #[serde(default)]
    pub end_double_bell: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sound: AmbianceSound::None,
            duration_minutes: 10,
            guidance_level: GuidanceLevel::BellOnly,
            haptics_enabled: false,
            bells_enabled: true,
            end_double_bell: false,
        }
    }
}

impl SessionConfig {
    pub fn total_seconds(&self) -> u32 {
        self.duration_minutes.saturating_mul(60)
    }

    pub fn is_indefinite(&self) -> bool {
        self.duration_minutes == 0
    }
}

/// Persistent engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Sounds shipped with the application
    pub assets_dir: PathBuf,

    /// Where downloaded and generated sounds are cached
    pub cache_dir: PathBuf,

    /// Remote location of sounds that are not bundled
    #[serde(default)]
    pub download_base_url: Option<String>,

    /// Ambiance level before ducking (0.0-1.0)
    pub ambiance_volume: f32,

    pub bell_volume: f32,

    pub guidance_volume: f32,

    pub preview_volume: f32,

    /// Last session the user ran
    #[serde(default)]
    pub last_session: Option<SessionConfig>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."));
        let cache_dir = dirs::cache_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("cache"));

        Self {
            assets_dir: data_dir.join("sounds"),
            cache_dir,
            download_base_url: None,
            ambiance_volume: 1.0,
            bell_volume: 0.8,
            guidance_volume: 1.0,
            preview_volume: 1.0,
            last_session: None,
        }
    }
}

impl EngineSettings {
    /// Load settings from `path` (or the platform default location).
    /// Creates a default file if none exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::LoadFailed {
                path: config_path.display().to_string(),
                source: Box::new(e),
            })?;
            let settings: EngineSettings =
                serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: config_path.display().to_string(),
                    source: Box::new(e),
                })?;
            settings.validate()?;

            tracing::info!("Loaded settings from: {}", config_path.display());
            Ok(settings)
        } else {
            let settings = EngineSettings::default();
            settings.save_to(&config_path)?;
            tracing::info!("Created default settings at: {}", config_path.display());
            Ok(settings)
        }
    }

    /// Save settings to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_err = |e: Box<dyn std::error::Error + Send + Sync>| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(Box::new(e)))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| save_err(Box::new(e)))?;
        fs::write(path, json).map_err(|e| save_err(Box::new(e)))?;

        Ok(())
    }

    /// `<config dir>/MeditationAudio/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("config.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// `<config dir>/MeditationAudio/logs`
    pub fn log_dir() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let volumes = [
            ("ambiance_volume", self.ambiance_volume),
            ("bell_volume", self.bell_volume),
            ("guidance_volume", self.guidance_volume),
            ("preview_volume", self.preview_volume),
        ];

        for (name, value) in volumes {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
