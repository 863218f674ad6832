//! Pending-writer configuration
//!
//! Defaults come from the build environment (see `build.rs`):
//!
//! - `SETTINGS_WRITE_DELAY_MS` - quiet period before a scheduled flush (2500)
//! - `SETTINGS_WRITER_STACK` - pending-writer task stack in bytes (4096)
//! - `SETTINGS_WRITER_PRIORITY` - pending-writer task priority (1)

use std::time::Duration;

/// Name given to every pending-writer task
pub const WRITER_TASK_NAME: &str = "settings-writer";

/// What the pending-writer task does when a flush fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Log the error and abort the process
    #[default]
    Abort,
    /// Log the error, count it, and go idle
    LogAndContinue,
}

/// Pending-writer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Quiet period after the last `schedule_write` before flushing
    pub delay: Duration,
    /// Task name passed to the spawner
    pub task_name: &'static str,
    /// Task stack size in bytes
    pub stack_size: usize,
    /// Task priority
    pub priority: u8,
    /// Behaviour on flush failure
    pub failure_policy: WriteFailurePolicy,
}

impl WriterConfig {
    /// Set the debounce delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the task stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Set the task priority
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the flush failure policy
    pub fn with_failure_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Debounce delay in microseconds, saturating
    pub fn delay_us(&self) -> u64 {
        u64::try_from(self.delay.as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(parse_or(env!("SETTINGS_WRITE_DELAY_MS"), 2500)),
            task_name: WRITER_TASK_NAME,
            stack_size: parse_or(env!("SETTINGS_WRITER_STACK"), 4096),
            priority: parse_or(env!("SETTINGS_WRITER_PRIORITY"), 1),
            failure_policy: WriteFailurePolicy::Abort,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: &str, fallback: T) -> T {
    value.parse().unwrap_or(fallback)
}
