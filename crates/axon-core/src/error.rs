//! Errors raised while loading, validating, and ordering a robot config

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error validating \"{path}\": \"{field}\" is required")]
    FieldRequired { path: String, field: String },
    #[error("error validating \"{path}\": {message}")]
    Invalid { path: String, message: String },
    #[error("component name \"{0}\" is not unique")]
    DuplicateName(String),
    #[error("error validating \"{path}\": dependency \"{dependency}\" does not exist")]
    MissingDependency { path: String, dependency: String },
    #[error("circular dependency detected in component list between {}", .0.join(", "))]
    CircularDependency(Vec<String>),
    #[error("board diff for \"{board}\": {message}")]
    BoardDiff { board: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn required(path: &str, field: &str) -> Self {
        Self::FieldRequired {
            path: path.to_string(),
            field: field.to_string(),
        }
    }
}
