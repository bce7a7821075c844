/// Scheduling module
///
/// Every "wait until this offset" in the engine is a registered timer callback,
/// never a blocking wait. All callbacks run serially on one loop, so components
/// only need short critical sections around their own state.
///
/// ## Architecture
///
/// ```text
///  Scheduler (trait)
///    ├── ThreadScheduler  - worker thread + crossbeam channel (production)
///    └── ManualScheduler  - virtual time advanced by hand (tests, dry runs)
///
///  VirtualClock  - session elapsed time, advanced by skip-forward
/// ```
pub mod clock;
pub mod manual;
pub mod timer;

pub use clock::VirtualClock;
pub use manual::ManualScheduler;
pub use timer::{Scheduler, Task, ThreadScheduler, TimerHandle};
