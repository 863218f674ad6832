//! Fatal error policy
//!
//! Storage failures that leave settings in an unknown state end the process.

use crate::platform::StorageError;

/// Log `error` and abort the process
pub fn abort_on(context: &str, error: StorageError) -> ! {
    crate::log_error!("Fatal settings error in {}: {}", context, error);
    std::process::abort()
}
