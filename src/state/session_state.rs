/// Session lifecycle state machine
///
/// `Idle → Starting → Active → Stopping → Idle`. Completion is not a state of
/// its own: a finished session simply goes through Stopping like any other.

use std::time::Duration;

/// State of the session orchestrator
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Idle,

    /// Assets are being prepared (transitional state)
    Starting,

    /// Session is playing; `since` is scheduler time at activation
    Active { since: Duration },

    /// Teardown in progress (transitional state)
    Stopping,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Stopping)
    }

    /// Get a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Starting => "Starting...",
            SessionState::Active { .. } => "Active",
            SessionState::Stopping => "Stopping...",
        }
    }
}

/// Rejected state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// Cannot start when a session already exists
    AlreadyRunning,

    /// Cannot stop when nothing is running
    AlreadyIdle,

    /// Cannot perform this action during a transition
    InTransition,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::AlreadyRunning => write!(f, "Session is already running"),
            TransitionError::AlreadyIdle => write!(f, "No session is running"),
            TransitionError::InTransition => {
                write!(f, "Cannot perform action during state transition")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// State machine for session transitions
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    /// Create a new state machine in the Idle state
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Idle → Starting
    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Starting;
                Ok(())
            }
            SessionState::Active { .. } => Err(TransitionError::AlreadyRunning),
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Starting → Active
    pub fn mark_active(&mut self, since: Duration) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Starting => {
                self.state = SessionState::Active { since };
                Ok(())
            }
            _ => Err(TransitionError::InTransition),
        }
    }

    /// Starting or Active → Stopping
    pub fn stop(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Starting | SessionState::Active { .. } => {
                self.state = SessionState::Stopping;
                Ok(())
            }
            SessionState::Idle => Err(TransitionError::AlreadyIdle),
            SessionState::Stopping => Err(TransitionError::InTransition),
        }
    }

    /// Stopping → Idle
    pub fn mark_idle(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Stopping => {
                self.state = SessionState::Idle;
                Ok(())
            }
            _ => Err(TransitionError::InTransition),
        }
    }
}
