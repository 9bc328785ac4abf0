//! Utility modules for common functionality

pub mod lock;

// Re-export commonly used items
pub use lock::{is_process_alive, setup_signal_handlers, PidLock};

// vim: ts=4
