//! Axon Process - Supervision of OS processes
//!
//! This crate provides the process supervisor used by the robot:
//! - The [`ManagedProcess`] contract (start/stop)
//! - [`OsProcess`], a process backed by `tokio::process`
//! - [`ProcessManager`], keyed by process ID with add-or-replace semantics
//! - Merge helpers that report replaced and removed processes

pub mod manager;
pub mod process;

pub use manager::{merge_add, merge_remove, ProcessManager};
pub use process::{ManagedProcess, OsProcess, ProcessError};
