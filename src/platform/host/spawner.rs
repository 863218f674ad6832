//! Thread-backed task spawner

use crate::platform::{Result, StorageError, TaskBody, TaskSpawner, TaskSpec};

/// Smallest stack handed to a host thread
///
/// Embedded stack budgets (a few KiB) are too small for host code that
/// formats log records, so they are raised to this floor.
pub const HOST_MIN_STACK: usize = 64 * 1024;

/// Spawns each task as a detached `std::thread`
///
/// The task name and stack size are applied to the thread; priority is
/// advisory on hosts and only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl ThreadSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, spec: &TaskSpec, body: TaskBody) -> Result<()> {
        crate::log_trace!(
            "Spawning task {} (stack {} bytes, priority {})",
            spec.name,
            spec.stack_size,
            spec.priority
        );

        std::thread::Builder::new()
            .name(spec.name.into())
            .stack_size(spec.stack_size.max(HOST_MIN_STACK))
            .spawn(body)
            .map(|_detached| ())
            .map_err(|_| {
                crate::log_error!("Failed to spawn task {}", spec.name);
                StorageError::SpawnFailed
            })
    }
}
