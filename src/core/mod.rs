//! Core settings functionality
//!
//! This module contains the platform-independent parts of the settings
//! stack: the storage engine and its bootstrap, the persistence stream and
//! debounced controller, the clock abstraction, and logging.

pub mod fatal;
pub mod logging;
pub mod settings;
pub mod storage;
pub mod traits;
