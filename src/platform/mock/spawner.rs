//! Recording task spawner for testing
//!
//! Runs tasks on real threads (via `ThreadSpawner`) while recording every
//! spawn request and how many tasks were alive at once.

use crate::platform::host::ThreadSpawner;
use crate::platform::{Result, StorageError, TaskBody, TaskSpawner, TaskSpec};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Counters {
    live: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
    fail_next: AtomicBool,
}

/// Spawner that records specs and concurrency
///
/// # Example
///
/// ```
/// use nvs_settings::platform::mock::RecordingSpawner;
/// use nvs_settings::platform::traits::{TaskSpawner, TaskSpec};
///
/// let spawner = RecordingSpawner::new();
/// let spec = TaskSpec { name: "demo", stack_size: 4096, priority: 1 };
/// spawner.spawn(&spec, Box::new(|| {})).unwrap();
/// assert_eq!(spawner.spawned(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSpawner {
    specs: Arc<Mutex<Vec<TaskSpec>>>,
    counters: Arc<Counters>,
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every spec passed to `spawn`, in order
    pub fn specs(&self) -> Vec<TaskSpec> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of tasks started
    pub fn spawned(&self) -> usize {
        self.specs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of tasks currently running
    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of tasks ever running at once
    ///
    /// A task stays live until its body returns, which can be after its
    /// controller already reports idle. Wait on [`finished`](Self::finished)
    /// before spawning again when asserting a peak of one across rounds.
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Number of tasks that returned
    pub fn finished(&self) -> usize {
        self.counters.finished.load(Ordering::SeqCst)
    }

    /// The next spawn request fails with `SpawnFailed`
    pub fn fail_next_spawn(&self) {
        self.counters.fail_next.store(true, Ordering::SeqCst);
    }
}

impl TaskSpawner for RecordingSpawner {
    fn spawn(&self, spec: &TaskSpec, body: TaskBody) -> Result<()> {
        if self.counters.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::SpawnFailed);
        }

        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*spec);

        // Count the task as live from the moment it is requested
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(live, Ordering::SeqCst);

        let counters = Arc::clone(&self.counters);
        let result = ThreadSpawner::new().spawn(
            spec,
            Box::new(move || {
                body();
                counters.live.fetch_sub(1, Ordering::SeqCst);
                counters.finished.fetch_add(1, Ordering::SeqCst);
            }),
        );

        if result.is_err() {
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }
}
