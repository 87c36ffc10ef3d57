//! Shapes of an externally computed difference between two configs
//!
//! Computing a diff is left to the caller; the robot only consumes it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::board::BoardConfigDiff;
use crate::component::Component;
use crate::config::{Config, FunctionConfig, ProcessConfig, RemoteConfig};

/// Partition of a config change into added, modified and removed parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub added: Config,
    #[serde(default)]
    pub modified: ModifiedConfigDiff,
    #[serde(default)]
    pub removed: Config,
}

impl Diff {
    /// True when nothing was added, modified or removed
    pub fn is_empty(&self) -> bool {
        self.added == Config::default()
            && self.modified == ModifiedConfigDiff::default()
            && self.removed == Config::default()
    }
}

/// The modified portion of a [`Diff`]
///
/// Boards carry a sub-resource level diff instead of a full config so they
/// can be merged in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiedConfigDiff {
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
    #[serde(default)]
    pub boards: BTreeMap<String, BoardConfigDiff>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub processes: Vec<ProcessConfig>,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
}
