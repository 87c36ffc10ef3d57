//! Error types for building, merging and closing robot parts

use axon_core::ConfigError;
use axon_process::ProcessError;
use thiserror::Error;

use crate::proxy::SensorKind;

#[derive(Error, Debug)]
pub enum RobotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sensor component \"{0}\" requires a subtype")]
    MissingSubtype(String),

    #[error("unknown component type: {kind} (component \"{name}\")")]
    UnknownComponentType { name: String, kind: String },

    #[error("failed to create {kind} \"{name}\": {source}")]
    Construct {
        kind: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("couldn't connect to robot remote ({address}): {source}")]
    RemoteConnect {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("cannot replace {existing} \"{name}\" with a {replacement}")]
    SensorKindMismatch {
        name: String,
        existing: SensorKind,
        replacement: SensorKind,
    },

    #[error("unexpected process replacement \"{0}\"")]
    UnexpectedProcessReplacement(String),

    #[error(transparent)]
    Close(#[from] CloseErrors),
}

/// One failure encountered while closing a set of parts
#[derive(Debug)]
pub struct CloseFailure {
    /// What was being closed, e.g. `arm "arm1"`
    pub target: String,
    pub error: anyhow::Error,
}

/// Every failure collected by a close that kept going
#[derive(Error, Debug)]
#[error("{}", describe(.0))]
pub struct CloseErrors(pub Vec<CloseFailure>);

fn describe(failures: &[CloseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("error closing {}: {:#}", f.target, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CloseErrors {
    pub fn failures(&self) -> &[CloseFailure] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_errors_joins_every_failure() {
        let err = CloseErrors(vec![
            CloseFailure {
                target: "arm \"arm1\"".to_string(),
                error: anyhow::anyhow!("stuck"),
            },
            CloseFailure {
                target: "camera \"cam\"".to_string(),
                error: anyhow::anyhow!("busy"),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "error closing arm \"arm1\": stuck; error closing camera \"cam\": busy"
        );
    }

    #[test]
    fn test_missing_subtype_message() {
        let err = RobotError::MissingSubtype("imu".to_string());
        assert_eq!(err.to_string(), "sensor component \"imu\" requires a subtype");
    }
}
