//! Component descriptors declared in a robot config

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;

/// Capability kind of a declared component
///
/// Unrecognized type strings are kept as [`ComponentType::Other`] so they can be
/// reported when the component is constructed instead of failing the parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComponentType {
    Arm,
    Base,
    Board,
    Camera,
    Gripper,
    Lidar,
    Sensor,
    Provider,
    Other(String),
}

impl ComponentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Arm => "arm",
            Self::Base => "base",
            Self::Board => "board",
            Self::Camera => "camera",
            Self::Gripper => "gripper",
            Self::Lidar => "lidar",
            Self::Sensor => "sensor",
            Self::Provider => "provider",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ComponentType {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "arm" => Self::Arm,
            "base" => Self::Base,
            "board" => Self::Board,
            "camera" => Self::Camera,
            "gripper" => Self::Gripper,
            "lidar" => Self::Lidar,
            "sensor" => Self::Sensor,
            "provider" => Self::Provider,
            _ => Self::Other(value),
        }
    }
}

impl From<ComponentType> for String {
    fn from(value: ComponentType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single component of a robot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique component name
    pub name: String,
    /// Capability kind
    #[serde(rename = "type")]
    pub r#type: ComponentType,
    /// Sensor subtype (e.g. "compass"); required for sensors
    #[serde(default, rename = "subtype", skip_serializing_if = "String::is_empty")]
    pub sub_type: String,
    /// Driver model used to construct the component
    #[serde(default)]
    pub model: String,
    /// Names of components that must be constructed first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Driver-specific attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Component {
    /// Create a component with no model, attributes, or dependencies
    pub fn new(name: impl Into<String>, r#type: ComponentType) -> Self {
        Self {
            name: name.into(),
            r#type,
            sub_type: String::new(),
            model: String::new(),
            depends_on: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    /// Builder-style helper to declare dependencies
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style helper to set the sensor subtype
    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = sub_type.into();
        self
    }

    /// Builder-style helper to set the driver model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn validate(&self, path: &str) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::required(path, "name"));
        }
        Ok(())
    }

    /// Look up a string attribute
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}
