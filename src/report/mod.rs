//! Validation reporting for classified streams.
//!
//! This module tracks how often each class matched while samples were
//! streamed through a classifier, and can persist those statistics.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, ClassStats, SharedValidationLog,
    ValidationLog, ValidationStats,
};
