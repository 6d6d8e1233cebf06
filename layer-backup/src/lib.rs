//! layer-backup library
//!
//! Periodic snapshots of the vector layers open for editing, keeping only the
//! latest snapshot of each distinct set of layers.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod host;
pub mod scheduler;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupExecutor, CycleOptions, CycleOutcome};
pub use scheduler::BackupScheduler;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
