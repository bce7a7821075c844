/// Manually driven scheduler
///
/// Time only moves when [`ManualScheduler::advance`] is called. Due callbacks
/// run on the caller's thread in deadline order, and blocking jobs run inline,
/// which makes whole sessions reproducible without sleeping.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

use super::timer::{run_task, Scheduler, Task, TimerHandle};

struct ManualState {
    now: Duration,
    seq: u64,
    queue: BTreeMap<(Duration, u64), (Task, TimerHandle)>,
}

pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                seq: 0,
                queue: BTreeMap::new(),
            }),
        }
    }

    /// Move time forward, running every callback that falls due on the way
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            // Pop under the lock, run without it: callbacks schedule more work
            let next = {
                let mut state = self.state.lock();
                let due = matches!(state.queue.keys().next(), Some(&(at, _)) if at <= target);
                if due {
                    let popped = state.queue.pop_first();
                    if let Some(((at, _), _)) = &popped {
                        state.now = state.now.max(*at);
                    }
                    popped.map(|(_, entry)| entry)
                } else {
                    None
                }
            };

            match next {
                Some((task, handle)) => {
                    if !handle.is_cancelled() {
                        run_task(task);
                    }
                }
                None => break,
            }
        }

        let mut state = self.state.lock();
        state.now = state.now.max(target);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Number of timers still queued and not cancelled
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queue
            .values()
            .filter(|(_, handle)| !handle.is_cancelled())
            .count()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.lock();
        let key = (state.now + delay, state.seq);
        state.seq += 1;
        state.queue.insert(key, (task, handle.clone()));
        handle
    }

    fn spawn_blocking(&self, job: Task) {
        run_task(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_advance_runs_due_tasks_in_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (delay, label) in [(300u64, "c"), (100, "a"), (200, "b")] {
            let log = Arc::clone(&log);
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || log.lock().push(label)),
            );
        }

        scheduler.advance_ms(150);
        assert_eq!(*log.lock(), vec!["a"]);

        scheduler.advance_ms(200);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(scheduler.now(), Duration::from_millis(350));
    }

    #[test]
    fn test_now_reflects_deadline_inside_callback() {
        let scheduler = Arc::new(ManualScheduler::new());
        let seen = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&scheduler);
        let seen_clone = Arc::clone(&seen);
        scheduler.schedule(
            Duration::from_millis(250),
            Box::new(move || *seen_clone.lock() = Some(inner.now())),
        );

        scheduler.advance_secs(1);
        assert_eq!(*seen.lock(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_tasks_scheduled_by_callbacks_run_in_same_advance() {
        let scheduler = Arc::new(ManualScheduler::new());
        let count = Arc::new(Mutex::new(0));

        let inner = Arc::clone(&scheduler);
        let count_clone = Arc::clone(&count);
        scheduler.schedule(
            Duration::from_millis(100),
            Box::new(move || {
                let count = Arc::clone(&count_clone);
                inner.schedule(Duration::from_millis(100), Box::new(move || *count.lock() += 1));
            }),
        );

        scheduler.advance_ms(200);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_cancelled_task_is_skipped() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(Mutex::new(false));

        let ran_clone = Arc::clone(&ran);
        let handle = scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || *ran_clone.lock() = true),
        );
        assert_eq!(scheduler.pending(), 1);

        handle.cancel();
        assert_eq!(scheduler.pending(), 0);

        scheduler.advance_ms(20);
        assert!(!*ran.lock());
    }
}
