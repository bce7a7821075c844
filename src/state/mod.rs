/// State management module
///
/// Lifecycle state for the session orchestrator.

pub mod session_state;

// Re-export commonly used types
pub use session_state::{SessionState, SessionStateMachine, TransitionError};
