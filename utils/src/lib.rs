//! Shared infrastructure utilities for Mender.
//!
//! This crate provides cross-cutting utilities that the edit engine and the tool
//! layer both need but that don't belong in the domain-pure `mender-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`diff`**: Unified diff formatting and stats

pub mod atomic_write;
pub mod diff;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, PersistMode, atomic_write, atomic_write_with_options,
    persist_text, recover_bak_file,
};
pub use diff::{compute_diff_stats, format_unified_diff};
