//! Single-shot delayed work on a dedicated thread.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkError {
    #[error("failed to spawn worker `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Default)]
struct WorkState {
    deadline: Option<Instant>,
    run_now: bool,
    running: bool,
    shutdown: bool,
    executed: u64,
}

struct WorkShared {
    name: String,
    job: Box<dyn Fn() + Send + Sync>,
    state: Mutex<WorkState>,
    cond: Condvar,
}

impl WorkShared {
    fn lock(&self) -> MutexGuard<'_, WorkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, WorkState>) -> MutexGuard<'a, WorkState> {
        self.cond
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A job that runs once, `delay` after it was scheduled.
///
/// At most one run is pending at a time. Dropping the work item discards a pending run and
/// waits for a running one.
pub struct DelayedWork {
    shared: Arc<WorkShared>,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for DelayedWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedWork")
            .field("name", &self.shared.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl DelayedWork {
    pub fn new(name: &str, job: impl Fn() + Send + Sync + 'static) -> Result<Self, WorkError> {
        let shared = Arc::new(WorkShared {
            name: name.to_string(),
            job: Box::new(job),
            state: Mutex::new(WorkState::default()),
            cond: Condvar::new(),
        });
        let worker = std::thread::Builder::new()
            .name(format!("work/{name}"))
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker(shared)
            })
            .map_err(|source| WorkError::Spawn {
                name: name.to_string(),
                source,
            })?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queues the job. Returns `false` and leaves the deadline alone if a run is already pending.
    pub fn schedule(&self, delay: Duration) -> bool {
        let mut state = self.shared.lock();
        if state.shutdown || state.deadline.is_some() {
            return false;
        }
        state.deadline = Some(Instant::now() + delay);
        self.shared.cond.notify_all();
        true
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }

    /// Discards a pending run. A run already in progress is not waited for.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.lock();
        state.run_now = false;
        let was_pending = state.deadline.take().is_some();
        self.shared.cond.notify_all();
        was_pending
    }

    /// Discards a pending run and waits for an in-progress run to finish.
    pub fn cancel_sync(&self) -> bool {
        let mut state = self.shared.lock();
        state.run_now = false;
        let was_pending = state.deadline.take().is_some();
        self.shared.cond.notify_all();
        while state.running {
            state = self.shared.wait(state);
        }
        was_pending
    }

    /// Runs a pending job right away and waits for it. Returns whether a run was pending.
    pub fn flush(&self) -> bool {
        let mut state = self.shared.lock();
        let was_pending = state.deadline.is_some();
        if was_pending {
            state.run_now = true;
            self.shared.cond.notify_all();
        }
        while (state.deadline.is_some() || state.running) && !state.shutdown {
            state = self.shared.wait(state);
        }
        was_pending
    }

    /// Completed runs since creation.
    pub fn executed(&self) -> u64 {
        self.shared.lock().executed
    }
}

impl Drop for DelayedWork {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.deadline = None;
            self.shared.cond.notify_all();
        }
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            tracing::error!(name = %self.shared.name, "delayed work panicked");
        }
    }
}

fn worker(shared: Arc<WorkShared>) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            break;
        }
        let Some(deadline) = state.deadline else {
            state = shared.wait(state);
            continue;
        };
        let now = Instant::now();
        if !state.run_now && now < deadline {
            state = shared
                .cond
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            continue;
        }
        state.deadline = None;
        state.run_now = false;
        state.running = true;
        drop(state);

        (shared.job)();

        state = shared.lock();
        state.running = false;
        state.executed += 1;
        shared.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter() -> (Arc<AtomicU32>, DelayedWork) {
        let count = Arc::new(AtomicU32::new(0));
        let work = DelayedWork::new("test", {
            let count = Arc::clone(&count);
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        (count, work)
    }

    #[test]
    fn fires_once_after_delay() {
        let (count, work) = counter();
        assert!(work.schedule(Duration::from_millis(10)));
        assert!(!work.schedule(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(work.executed(), 1);
        assert!(!work.is_pending());
    }

    #[test]
    fn cancel_discards_pending_run() {
        let (count, work) = counter();
        work.schedule(Duration::from_secs(60));
        assert!(work.cancel_sync());
        assert!(!work.flush());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn flush_runs_immediately() {
        let (count, work) = counter();
        work.schedule(Duration::from_secs(60));
        assert!(work.flush());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(work.schedule(Duration::from_secs(60)));
    }

    #[test]
    fn drop_discards_pending_run() {
        let (count, work) = counter();
        work.schedule(Duration::from_secs(60));
        drop(work);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
