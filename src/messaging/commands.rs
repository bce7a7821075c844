/// Command types for the engine
///
/// Commands represent requests to perform actions (imperative).
/// They are executed by the command executor.
use crate::audio_system::AmbianceSound;
use crate::config::{GuidanceLevel, SessionConfig};

/// Engine commands
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Start a session, replacing any running one
    StartSession { config: SessionConfig },

    /// Stop the running session
    StopSession,

    /// Jump the running session forward
    SkipForward { seconds: u32 },

    /// Play a short sample of an ambiance sound
    PreviewSound { sound: AmbianceSound },

    /// Report the engine state
    Status,

    /// Quit the application
    Quit,
}

/// Result of command execution
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Command executed successfully
    Success,

    /// Command executed with a specific result
    SuccessWithValue(String),

    /// Command failed with an error
    Error(String),
}

impl EngineCommand {
    /// Get a human-readable description of the command
    pub fn description(&self) -> String {
        match self {
            EngineCommand::StartSession { config } => format!(
                "Start session: {} for {} min",
                config.sound, config.duration_minutes
            ),
            EngineCommand::StopSession => "Stop session".to_string(),
            EngineCommand::SkipForward { seconds } => format!("Skip forward {}s", seconds),
            EngineCommand::PreviewSound { sound } => format!("Preview {}", sound),
            EngineCommand::Status => "Status".to_string(),
            EngineCommand::Quit => "Quit application".to_string(),
        }
    }

    /// Parse one line of console input.
    ///
    /// `start [sound] [minutes] [level]` fills omitted fields from `base`.
    pub fn parse(line: &str, base: &SessionConfig) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };
        let args: Vec<&str> = words.collect();

        match verb.to_ascii_lowercase().as_str() {
            "start" => {
                let mut config = base.clone();
                if let Some(sound) = args.first() {
                    config.sound = sound.parse()?;
                }
                if let Some(minutes) = args.get(1) {
                    config.duration_minutes = minutes
                        .parse()
                        .map_err(|_| format!("invalid minutes '{}'", minutes))?;
                }
                if let Some(level) = args.get(2) {
                    let level: u8 = level
                        .parse()
                        .map_err(|_| format!("invalid guidance level '{}'", level))?;
                    config.guidance_level = GuidanceLevel::try_from(level)?;
                }
                Ok(EngineCommand::StartSession { config })
            }
            "stop" => Ok(EngineCommand::StopSession),
            "skip" => {
                let seconds = args.first().ok_or("usage: skip <seconds>")?;
                let seconds = seconds
                    .parse()
                    .map_err(|_| format!("invalid seconds '{}'", seconds))?;
                Ok(EngineCommand::SkipForward { seconds })
            }
            "preview" => {
                let sound = args.first().ok_or("usage: preview <sound>")?;
                Ok(EngineCommand::PreviewSound {
                    sound: sound.parse()?,
                })
            }
            "status" => Ok(EngineCommand::Status),
            "quit" | "exit" => Ok(EngineCommand::Quit),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_description() {
        let cmd = EngineCommand::StopSession;
        assert_eq!(cmd.description(), "Stop session");

        let cmd = EngineCommand::SkipForward { seconds: 60 };
        assert_eq!(cmd.description(), "Skip forward 60s");
    }

    #[test]
    fn test_parse_start_with_overrides() {
        let base = SessionConfig::default();
        let cmd = EngineCommand::parse("start rain 20 2", &base).unwrap();

        match cmd {
            EngineCommand::StartSession { config } => {
                assert_eq!(config.sound, AmbianceSound::Rain);
                assert_eq!(config.duration_minutes, 20);
                assert_eq!(config.guidance_level, GuidanceLevel::Gentle);
                assert_eq!(config.bells_enabled, base.bells_enabled);
            }
            other => panic!("Expected StartSession, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_simple_commands() {
        let base = SessionConfig::default();
        assert_eq!(
            EngineCommand::parse("  skip 120 ", &base),
            Ok(EngineCommand::SkipForward { seconds: 120 })
        );
        assert_eq!(
            EngineCommand::parse("preview ocean", &base),
            Ok(EngineCommand::PreviewSound {
                sound: AmbianceSound::Ocean
            })
        );
        assert_eq!(EngineCommand::parse("EXIT", &base), Ok(EngineCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        let base = SessionConfig::default();
        assert!(EngineCommand::parse("", &base).is_err());
        assert!(EngineCommand::parse("skip", &base).is_err());
        assert!(EngineCommand::parse("skip soon", &base).is_err());
        assert!(EngineCommand::parse("start rain 10 7", &base).is_err());
        assert!(EngineCommand::parse("dance", &base).is_err());
    }
}
