//! Timed meditation audio sessions.
//!
//! A session layers a looping ambiance bed, interval bells and spoken guidance
//! cues on a virtual clock that can be skipped forward. Voice cues duck the
//! ambiance while they play, and finite sessions fade out before they end.
//!
//! ```rust,ignore
//! let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new()?);
//! let engine = SessionEngine::new(
//!     scheduler.clone(),
//!     Arc::new(RodioBackend::try_default()?),
//!     Arc::new(CachedAssetResolver::from_settings(&settings)),
//!     &settings,
//!     EventBus::new(),
//! );
//! engine.start_session(SessionConfig::default())?;
//! ```

pub mod assets;
pub mod audio_system;
pub mod config;
pub mod cues;
pub mod error;
pub mod messaging;
pub mod scheduling;
pub mod session;
pub mod state;

pub use config::{EngineSettings, GuidanceLevel, SessionConfig};
pub use session::SessionEngine;
