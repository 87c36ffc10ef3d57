//! Board configuration and per-board diffs
//!
//! A board exposes named sub-resources (analog readers and digital
//! interrupts). A [`BoardConfigDiff`] describes a partial change to those
//! sub-resources so that a running board can be merged rather than rebuilt.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;

/// An analog reader attached to a board pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogConfig {
    pub name: String,
    pub pin: String,
    /// Averaging window in milliseconds (0 disables averaging)
    #[serde(default)]
    pub average_over_ms: u32,
}

/// A digital interrupt attached to a board pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalInterruptConfig {
    pub name: String,
    pub pin: String,
    /// Interrupt flavor, e.g. "basic" or "servo"
    #[serde(default, rename = "type")]
    pub r#type: String,
}

/// Configuration of a single board
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analogs: Vec<AnalogConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digital_interrupts: Vec<DigitalInterruptConfig>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl BoardConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self, path: &str) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::required(path, "name"));
        }
        for (idx, analog) in self.analogs.iter().enumerate() {
            let sub_path = format!("{}.analogs.{}", path, idx);
            if analog.name.is_empty() {
                return Err(ConfigError::required(&sub_path, "name"));
            }
            if analog.pin.is_empty() {
                return Err(ConfigError::required(&sub_path, "pin"));
            }
        }
        for (idx, interrupt) in self.digital_interrupts.iter().enumerate() {
            let sub_path = format!("{}.digital_interrupts.{}", path, idx);
            if interrupt.name.is_empty() {
                return Err(ConfigError::required(&sub_path, "name"));
            }
            if interrupt.pin.is_empty() {
                return Err(ConfigError::required(&sub_path, "pin"));
            }
        }

        let mut seen = HashSet::new();
        let sub_names = self
            .analogs
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.digital_interrupts.iter().map(|d| d.name.as_str()));
        for name in sub_names {
            if !seen.insert(name) {
                return Err(ConfigError::Invalid {
                    path: path.to_string(),
                    message: format!("sub-resource name \"{}\" is not unique", name),
                });
            }
        }
        Ok(())
    }
}

/// Sub-resource level difference between two versions of one board
///
/// `added`, `removed` and `modified` only carry the sub-resources that
/// changed; their `name` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardConfigDiff {
    /// The board config currently running
    pub left: BoardConfig,
    #[serde(default)]
    pub added: BoardConfig,
    #[serde(default)]
    pub removed: BoardConfig,
    #[serde(default)]
    pub modified: BoardConfig,
}

impl BoardConfigDiff {
    /// Names of analog readers touched by this diff, grouped by change
    pub fn analog_changes(&self) -> SubResourceChanges {
        SubResourceChanges {
            added: names(&self.added.analogs, |a| &a.name),
            removed: names(&self.removed.analogs, |a| &a.name),
            modified: names(&self.modified.analogs, |a| &a.name),
        }
    }

    /// Names of digital interrupts touched by this diff, grouped by change
    pub fn digital_interrupt_changes(&self) -> SubResourceChanges {
        SubResourceChanges {
            added: names(&self.added.digital_interrupts, |d| &d.name),
            removed: names(&self.removed.digital_interrupts, |d| &d.name),
            modified: names(&self.modified.digital_interrupts, |d| &d.name),
        }
    }

    /// Apply the diff to `left`, producing the full new board config
    pub fn to_config(&self) -> Result<BoardConfig, ConfigError> {
        let board = self.left.name.clone();
        let mut config = self.left.clone();

        if !self.modified.model.is_empty() {
            config.model = self.modified.model.clone();
        }
        config
            .attributes
            .extend(self.modified.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

        for removed in &self.removed.analogs {
            let before = config.analogs.len();
            config.analogs.retain(|a| a.name != removed.name);
            if config.analogs.len() == before {
                return Err(diff_error(&board, "removed", "analog", &removed.name));
            }
        }
        for modified in &self.modified.analogs {
            let slot = config
                .analogs
                .iter_mut()
                .find(|a| a.name == modified.name)
                .ok_or_else(|| diff_error(&board, "modified", "analog", &modified.name))?;
            *slot = modified.clone();
        }
        for added in &self.added.analogs {
            if config.analogs.iter().any(|a| a.name == added.name) {
                return Err(ConfigError::BoardDiff {
                    board: board.clone(),
                    message: format!("added analog \"{}\" already exists", added.name),
                });
            }
            config.analogs.push(added.clone());
        }

        for removed in &self.removed.digital_interrupts {
            let before = config.digital_interrupts.len();
            config.digital_interrupts.retain(|d| d.name != removed.name);
            if config.digital_interrupts.len() == before {
                return Err(diff_error(&board, "removed", "digital interrupt", &removed.name));
            }
        }
        for modified in &self.modified.digital_interrupts {
            let slot = config
                .digital_interrupts
                .iter_mut()
                .find(|d| d.name == modified.name)
                .ok_or_else(|| {
                    diff_error(&board, "modified", "digital interrupt", &modified.name)
                })?;
            *slot = modified.clone();
        }
        for added in &self.added.digital_interrupts {
            if config.digital_interrupts.iter().any(|d| d.name == added.name) {
                return Err(ConfigError::BoardDiff {
                    board: board.clone(),
                    message: format!("added digital interrupt \"{}\" already exists", added.name),
                });
            }
            config.digital_interrupts.push(added.clone());
        }

        Ok(config)
    }
}

/// Sub-resource names grouped by how they changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubResourceChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

fn names<T>(items: &[T], name: impl Fn(&T) -> &String) -> Vec<String> {
    items.iter().map(|item| name(item).clone()).collect()
}

fn diff_error(board: &str, change: &str, kind: &str, name: &str) -> ConfigError {
    ConfigError::BoardDiff {
        board: board.to_string(),
        message: format!("{} {} \"{}\" does not exist", change, kind, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analog(name: &str, pin: &str) -> AnalogConfig {
        AnalogConfig {
            name: name.to_string(),
            pin: pin.to_string(),
            average_over_ms: 0,
        }
    }

    fn base_board() -> BoardConfig {
        BoardConfig {
            name: "board1".to_string(),
            model: "fake".to_string(),
            analogs: vec![analog("a1", "1"), analog("a2", "2")],
            digital_interrupts: vec![DigitalInterruptConfig {
                name: "encoder".to_string(),
                pin: "15".to_string(),
                r#type: "basic".to_string(),
            }],
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn test_validate_reports_sub_resource_path() {
        let mut board = base_board();
        board.analogs[1].pin.clear();
        let err = board.validate("boards.0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "error validating \"boards.0.analogs.1\": \"pin\" is required"
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_sub_resource() {
        let mut board = base_board();
        board.analogs.push(analog("encoder", "9"));
        let err = board.validate("boards.0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "error validating \"boards.0\": sub-resource name \"encoder\" is not unique"
        );
    }

    #[test]
    fn test_diff_to_config() {
        let diff = BoardConfigDiff {
            left: base_board(),
            added: BoardConfig {
                analogs: vec![analog("a3", "3")],
                ..Default::default()
            },
            removed: BoardConfig {
                analogs: vec![analog("a1", "1")],
                ..Default::default()
            },
            modified: BoardConfig {
                analogs: vec![analog("a2", "22")],
                ..Default::default()
            },
        };

        let config = diff.to_config().unwrap();
        let pins: Vec<_> = config
            .analogs
            .iter()
            .map(|a| (a.name.as_str(), a.pin.as_str()))
            .collect();
        assert_eq!(pins, vec![("a2", "22"), ("a3", "3")]);
        assert_eq!(config.digital_interrupts.len(), 1);

        let changes = diff.analog_changes();
        assert_eq!(changes.added, vec!["a3".to_string()]);
        assert_eq!(changes.removed, vec!["a1".to_string()]);
        assert_eq!(changes.modified, vec!["a2".to_string()]);
    }

    #[test]
    fn test_digital_interrupt_changes() {
        let interrupt = |name: &str| DigitalInterruptConfig {
            name: name.to_string(),
            pin: "7".to_string(),
            r#type: "basic".to_string(),
        };
        let diff = BoardConfigDiff {
            left: base_board(),
            added: BoardConfig {
                digital_interrupts: vec![interrupt("servo")],
                ..Default::default()
            },
            removed: BoardConfig {
                digital_interrupts: vec![interrupt("encoder")],
                ..Default::default()
            },
            ..Default::default()
        };

        let changes = diff.digital_interrupt_changes();
        assert_eq!(changes.added, vec!["servo".to_string()]);
        assert_eq!(changes.removed, vec!["encoder".to_string()]);
        assert!(changes.modified.is_empty());
        assert!(diff.analog_changes().added.is_empty());
    }

    #[test]
    fn test_diff_modifying_missing_pin_fails() {
        let diff = BoardConfigDiff {
            left: base_board(),
            modified: BoardConfig {
                analogs: vec![analog("nope", "9")],
                ..Default::default()
            },
            ..Default::default()
        };
        let err = diff.to_config().unwrap_err();
        assert!(matches!(err, ConfigError::BoardDiff { .. }));
        assert!(err.to_string().contains("nope"));
    }
}
