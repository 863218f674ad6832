//! Task spawning trait
//!
//! Background work (the pending settings writer) is started through
//! [`TaskSpawner`]. A task terminates itself by returning from its body.

use crate::platform::Result;

/// Parameters for a spawned task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Human-readable task name
    pub name: &'static str,
    /// Stack budget in bytes
    pub stack_size: usize,
    /// Scheduler priority (higher runs first where supported)
    pub priority: u8,
}

/// Unit of work run by a spawned task
pub type TaskBody = Box<dyn FnOnce() + Send + 'static>;

/// Starts independent, concurrently scheduled tasks
pub trait TaskSpawner: Send + Sync {
    /// Start `body` as a new task
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SpawnFailed` if the task could not be created.
    fn spawn(&self, spec: &TaskSpec, body: TaskBody) -> Result<()>;
}
