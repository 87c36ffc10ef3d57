//! Axon Core - Robot configuration model and dependency ordering
//!
//! This crate provides the declarative side of the Axon robot runtime:
//! - Config sections (cloud, remotes, boards, components, processes, functions)
//! - Per-section validation with field paths
//! - Topological sorting of components by their declared dependencies
//! - Board sub-resource diffs and the shapes of config diffs

pub mod board;
pub mod component;
pub mod config;
pub mod diff;
pub mod error;
pub mod sort;

pub use board::{AnalogConfig, BoardConfig, BoardConfigDiff, DigitalInterruptConfig, SubResourceChanges};
pub use component::{Component, ComponentType};
pub use config::{CloudConfig, Config, FunctionConfig, ProcessConfig, RemoteConfig};
pub use diff::{Diff, ModifiedConfigDiff};
pub use error::ConfigError;
pub use sort::sort_components;
