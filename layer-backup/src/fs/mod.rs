//! File system helpers: shallow listings and snapshot directories.

pub mod snapshot;
pub mod walker;
