//! Robot configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::board::BoardConfig;
use crate::component::Component;
use crate::error::ConfigError;
use crate::sort::sort_components;

/// Refresh interval applied when a cloud config leaves it unset
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 10;

/// The declarative description of one robot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<RemoteConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boards: Vec<BoardConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<ProcessConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionConfig>,
}

impl Config {
    /// Load a config from a TOML (`.toml`) or JSON (anything else) file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let config = if is_toml {
            Self::from_toml(&content)?
        } else {
            Self::from_json(&content)?
        };
        info!(
            path = %path.display(),
            components = config.components.len(),
            "Loaded robot configuration"
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Validate every section and sort components by dependency.
    ///
    /// `from_cloud` selects which cloud credentials are required. On success
    /// `components` is replaced by its topologically sorted form.
    pub fn ensure(&mut self, from_cloud: bool) -> Result<(), ConfigError> {
        if let Some(cloud) = self.cloud.as_mut() {
            cloud.validate("cloud", from_cloud)?;
        }

        for (idx, remote) in self.remotes.iter().enumerate() {
            remote.validate(&format!("remotes.{}", idx))?;
        }

        for (idx, board) in self.boards.iter().enumerate() {
            board.validate(&format!("boards.{}", idx))?;
        }

        for (idx, component) in self.components.iter().enumerate() {
            component.validate(&format!("components.{}", idx))?;
        }

        if !self.components.is_empty() {
            self.components = sort_components(&self.components)?;
            debug!(
                order = ?self.components.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "Sorted components"
            );
        }

        for (idx, process) in self.processes.iter().enumerate() {
            process.validate(&format!("processes.{}", idx))?;
        }

        for (idx, function) in self.functions.iter().enumerate() {
            function.validate(&format!("functions.{}", idx))?;
        }

        Ok(())
    }

    /// Find a component by name
    pub fn find_component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Cloud connection settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default, rename = "self")]
    pub self_address: String,
    #[serde(default)]
    pub signaling_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_path: String,
    /// How often to refresh the config from the cloud (0 means unset)
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

impl CloudConfig {
    pub fn validate(&mut self, path: &str, from_cloud: bool) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::required(path, "id"));
        }
        if from_cloud {
            if self.self_address.is_empty() {
                return Err(ConfigError::required(path, "self"));
            }
        } else if self.secret.is_empty() {
            return Err(ConfigError::required(path, "secret"));
        }
        if self.refresh_interval_secs == 0 {
            self.refresh_interval_secs = DEFAULT_REFRESH_INTERVAL_SECS;
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// A remote robot whose parts are merged into this one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    pub address: String,
    /// Present the remote's names as "<remote>.<name>"
    #[serde(default)]
    pub prefix: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
}

impl RemoteConfig {
    pub fn validate(&self, path: &str) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::required(path, "name"));
        }
        if self.address.is_empty() {
            return Err(ConfigError::required(path, "address"));
        }
        Ok(())
    }
}

/// An OS process managed alongside the robot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub id: String,
    /// Executable to run
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cwd: String,
    /// Run to completion on start instead of supervising
    #[serde(default)]
    pub one_shot: bool,
    /// Forward the process output to the log
    #[serde(default)]
    pub log: bool,
}

impl ProcessConfig {
    pub fn validate(&self, path: &str) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::required(path, "id"));
        }
        if self.name.is_empty() {
            return Err(ConfigError::required(path, "name"));
        }
        Ok(())
    }
}

/// A named function evaluated by a scripting engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    pub engine: String,
    pub source: String,
}

impl FunctionConfig {
    pub fn validate(&self, path: &str) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::required(path, "name"));
        }
        if self.engine.is_empty() {
            return Err(ConfigError::required(path, "engine"));
        }
        if self.source.is_empty() {
            return Err(ConfigError::required(path, "source"));
        }
        Ok(())
    }
}
