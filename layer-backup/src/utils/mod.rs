//! Utility modules for layer backups.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
