/// Messaging module for Event/Command architecture
///
/// This module implements the Event/Command segregation pattern:
/// - **Events**: Notifications of things that happened (past tense, broadcast)
/// - **Commands**: Requests to perform actions (imperative, targeted)
///
/// ## Architecture
///
/// ```text
/// ┌─────────┐     Command      ┌──────────┐               ┌───────────────┐
/// │ Console │ ───────────────> │ Executor │ ────────────> │ SessionEngine │
/// └─────────┘                  └──────────┘               └───────────────┘
///                                                                 │
///                                                                 │ Publishes
///                                                                 ▼
///                                                           ┌───────────┐
///                                                           │ Event Bus │
///                                                           └───────────┘
///                                                                 │
///                                                                 ▼
///                                                     haptics / visuals / logging
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let bus = EventBus::new();
/// let (rx, _id) = bus.subscribe();
///
/// let engine = Arc::new(SessionEngine::new(scheduler, backend, resolver, &settings, bus));
/// let executor = CommandExecutor::new(engine);
/// executor.start_processing()?;
///
/// executor.execute(EngineCommand::SkipForward { seconds: 60 });
///
/// while let Ok(event) = rx.recv() {
///     match event {
///         SessionEvent::Ducked => { /* dim visuals */ },
///         SessionEvent::SessionCompleted => break,
///         _ => {}
///     }
/// }
/// ```

pub mod bus;
pub mod commands;
pub mod events;
pub mod executor;

// Re-export commonly used types
pub use bus::{EventBus, SubscriberId};
pub use commands::{CommandResult, EngineCommand};
pub use events::SessionEvent;
pub use executor::CommandExecutor;
