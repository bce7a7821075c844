/// Audio system module
///
/// Everything that makes sound during a session:
/// - Player handles over a pluggable backend (rodio, or a recording backend
///   for dry runs and tests)
/// - Off-loop clip loading
/// - The ambiance loop with crossfades, fade-out, silence mode and previews
/// - The ducking coordinator that lowers the ambiance under voice cues
///
/// ## Architecture
///
/// ```text
/// AmbianceLoopController
///   ├── current: AudioPlayerHandle  ─┐ crossfade
///   ├── next:    AudioPlayerHandle  ─┘
///   └── PreviewPlayer
///
/// DuckingCoordinator ── multiplier ──► AmbianceLoopController (DuckListener)
///
/// ClipLoader ── AssetResolver ──► AudioBackend ──► PlaybackSink
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let loader = ClipLoader::new(scheduler.clone(), backend, resolver);
/// let ducking = DuckingCoordinator::new(scheduler.clone(), bus.clone());
/// let ambiance = AmbianceLoopController::new(loader, clock, ducking.clone(), bus, 1.0, 1.0);
///
/// ambiance.start(AmbianceSound::Rain, 600);
/// ducking.duck();
/// ```
pub mod ambiance;
pub mod backend;
pub mod ducking;
pub mod effects;
pub mod loader;
pub mod player;
pub mod preview;
pub mod probe;
pub mod recording;
pub mod source;

// Re-export commonly used types
pub use ambiance::{AmbianceLoopController, LoopPhase};
pub use backend::{AudioBackend, PlaybackSink, RodioBackend};
pub use ducking::{DuckListener, DuckState, DuckingCoordinator};
pub use loader::ClipLoader;
pub use player::AudioPlayerHandle;
pub use preview::PreviewPlayer;
pub use recording::{PlayerRecord, RecordingBackend};
pub use source::{AmbianceSound, AudioSourceType};
