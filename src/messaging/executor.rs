/// Command executor
///
/// Runs engine commands, either inline or on a background thread fed by a
/// channel. Outcomes reach subscribers as `SessionEvent`s from the engine.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use super::commands::{CommandResult, EngineCommand};
use crate::session::SessionEngine;

/// Command executor that drives a session engine
pub struct CommandExecutor {
    command_tx: Sender<EngineCommand>,
    command_rx: Receiver<EngineCommand>,
    engine: Arc<SessionEngine>,
}

impl CommandExecutor {
    pub fn new(engine: Arc<SessionEngine>) -> Self {
        let (tx, rx) = unbounded();

        Self {
            command_tx: tx,
            command_rx: rx,
            engine,
        }
    }

    /// Get a sender for submitting commands
    pub fn sender(&self) -> Sender<EngineCommand> {
        self.command_tx.clone()
    }

    /// Execute a command immediately (blocking)
    pub fn execute_sync(&self, command: EngineCommand) -> CommandResult {
        tracing::info!("Executing command: {}", command.description());

        match command {
            EngineCommand::StartSession { config } => match self.engine.start_session(config) {
                Ok(()) => CommandResult::Success,
                Err(e) => CommandResult::Error(e.to_string()),
            },
            EngineCommand::StopSession => {
                self.engine.stop_session();
                CommandResult::Success
            }
            EngineCommand::SkipForward { seconds } => match self.engine.skip_forward(seconds) {
                Ok(()) => CommandResult::SuccessWithValue(format!(
                    "now at {}s",
                    self.engine.virtual_elapsed_ms() / 1000
                )),
                Err(e) => CommandResult::Error(e.to_string()),
            },
            EngineCommand::PreviewSound { sound } => match self.engine.preview_sound(sound) {
                Ok(()) => CommandResult::Success,
                Err(e) => CommandResult::Error(e.to_string()),
            },
            EngineCommand::Status => {
                let state = self.engine.state();
                let status = if state.is_active() {
                    format!(
                        "{} at {}s, ambiance {:?}",
                        state.description(),
                        self.engine.virtual_elapsed_ms() / 1000,
                        self.engine.ambiance_phase()
                    )
                } else {
                    state.description().to_string()
                };
                CommandResult::SuccessWithValue(status)
            }
            EngineCommand::Quit => {
                self.engine.dispose();
                CommandResult::Success
            }
        }
    }

    /// Execute a command asynchronously
    pub fn execute(&self, command: EngineCommand) {
        let _ = self.command_tx.send(command);
    }

    /// Start the command processing loop in a background thread
    pub fn start_processing(&self) -> std::io::Result<thread::JoinHandle<()>> {
        let rx = self.command_rx.clone();
        let executor = Self {
            command_tx: self.command_tx.clone(),
            command_rx: self.command_rx.clone(),
            engine: Arc::clone(&self.engine),
        };

        thread::Builder::new()
            .name("command-executor".to_string())
            .spawn(move || {
                tracing::info!("Command executor thread started");

                while let Ok(command) = rx.recv() {
                    let quit = command == EngineCommand::Quit;
                    match executor.execute_sync(command) {
                        CommandResult::Success => {}
                        CommandResult::SuccessWithValue(value) => tracing::info!("{}", value),
                        CommandResult::Error(e) => tracing::warn!("Command failed: {}", e),
                    }
                    if quit {
                        tracing::info!("Quit command received, stopping executor");
                        break;
                    }
                }

                tracing::info!("Command executor thread stopped");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PassthroughResolver;
    use crate::audio_system::RecordingBackend;
    use crate::config::{EngineSettings, SessionConfig};
    use crate::messaging::{EventBus, SessionEvent};
    use crate::scheduling::ManualScheduler;
    use std::time::Duration;

    fn executor() -> (Arc<ManualScheduler>, CommandExecutor) {
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = SessionEngine::new(
            scheduler.clone(),
            Arc::new(RecordingBackend::new(scheduler.clone())),
            Arc::new(PassthroughResolver::new("/sounds")),
            &EngineSettings::default(),
            EventBus::new(),
        );
        (scheduler, CommandExecutor::new(Arc::new(engine)))
    }

    #[test]
    fn test_command_executor_creation() {
        let (_scheduler, executor) = executor();
        let sender = executor.sender();
        assert!(sender.send(EngineCommand::Status).is_ok());
    }

    #[test]
    fn test_start_skip_stop() {
        let (scheduler, executor) = executor();

        let result = executor.execute_sync(EngineCommand::StartSession {
            config: SessionConfig::default(),
        });
        assert_eq!(result, CommandResult::Success);
        scheduler.advance(Duration::ZERO);

        assert_eq!(
            executor.execute_sync(EngineCommand::SkipForward { seconds: 60 }),
            CommandResult::SuccessWithValue("now at 60s".to_string())
        );
        assert_eq!(executor.execute_sync(EngineCommand::StopSession), CommandResult::Success);
    }

    #[test]
    fn test_skip_when_idle_reports_error() {
        let (_scheduler, executor) = executor();
        match executor.execute_sync(EngineCommand::SkipForward { seconds: 10 }) {
            CommandResult::Error(message) => assert_eq!(message, "Session is not active"),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_quit_disposes_engine() {
        let (scheduler, executor) = executor();
        let (rx, _id) = executor.engine.events().subscribe();

        executor.execute_sync(EngineCommand::StartSession {
            config: SessionConfig::default(),
        });
        scheduler.advance(Duration::ZERO);
        executor.execute_sync(EngineCommand::Quit);

        assert!(rx
            .try_iter()
            .any(|event| event == SessionEvent::SessionStopped { completed: false }));
        assert_eq!(
            executor.execute_sync(EngineCommand::PreviewSound {
                sound: crate::audio_system::AmbianceSound::Rain
            }),
            CommandResult::Error("Engine has been disposed".to_string())
        );
    }
}
