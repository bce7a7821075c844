/// Timer facility
///
/// A single worker thread owns an ordered queue of deadlines and runs due
/// callbacks one at a time. Callers talk to it through a crossbeam channel, so
/// scheduling never blocks on a running callback.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// A one-shot unit of work run by a scheduler
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation token returned for every scheduled timer
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the timer. A cancelled timer never runs, even if already due.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Timer seam used by every engine component
pub trait Scheduler: Send + Sync {
    /// Monotonic time since the scheduler was created
    fn now(&self) -> Duration;

    /// Run `task` on the timer loop after `delay`
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Run blocking work (downloads, decoding) off the timer loop.
    ///
    /// Jobs must not touch component state directly; they post a continuation
    /// back through [`Scheduler::schedule`].
    fn spawn_blocking(&self, job: Task);
}

/// Run a callback, containing any panic so the loop survives it
pub(crate) fn run_task(task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!("Scheduled callback panicked; continuing");
    }
}

enum Message {
    Schedule {
        at: Duration,
        task: Task,
        handle: TimerHandle,
    },
    Shutdown,
}

/// Real-time scheduler backed by a dedicated worker thread
pub struct ThreadScheduler {
    origin: Instant,
    tx: Sender<Message>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadScheduler {
    /// Spawn the timer worker thread
    pub fn new() -> Result<Self, std::io::Error> {
        let origin = Instant::now();
        let (tx, rx) = unbounded();

        let worker = thread::Builder::new()
            .name("session-timers".to_string())
            .spawn(move || run_loop(origin, rx))?;

        Ok(Self {
            origin,
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }
}

fn run_loop(origin: Instant, rx: Receiver<Message>) {
    let mut queue: BTreeMap<(Duration, u64), (Task, TimerHandle)> = BTreeMap::new();
    let mut seq: u64 = 0;

    tracing::debug!("Timer loop started");

    loop {
        // Drain everything that is due
        loop {
            let due = matches!(queue.keys().next(), Some(&(at, _)) if at <= origin.elapsed());
            if !due {
                break;
            }
            if let Some((_, (task, handle))) = queue.pop_first() {
                if !handle.is_cancelled() {
                    run_task(task);
                }
            }
        }

        let message = match queue.keys().next() {
            Some(&(at, _)) => {
                let wait = at.saturating_sub(origin.elapsed());
                match rx.recv_timeout(wait) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        match message {
            Message::Schedule { at, task, handle } => {
                queue.insert((at, seq), (task, handle));
                seq += 1;
            }
            Message::Shutdown => break,
        }
    }

    tracing::debug!(pending = queue.len(), "Timer loop stopped");
}

impl Scheduler for ThreadScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let message = Message::Schedule {
            at: self.now() + delay,
            task,
            handle: handle.clone(),
        };

        if self.tx.send(message).is_err() {
            tracing::debug!("Timer loop is gone; dropping scheduled task");
            handle.cancel();
        }
        handle
    }

    fn spawn_blocking(&self, job: Task) {
        let spawned = thread::Builder::new()
            .name("session-io".to_string())
            .spawn(move || run_task(job));

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn blocking job: {}", e);
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);

        if let Some(worker) = self.worker.lock().take() {
            // The last owner may be a callback running on the worker itself
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
