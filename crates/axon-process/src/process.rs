//! Managed processes and the OS-backed implementation

use async_trait::async_trait;
use axon_core::ProcessConfig;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn process \"{id}\": {source}")]
    Spawn {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process \"{id}\" exited unsuccessfully ({status})")]
    Exited { id: String, status: String },
    #[error("failed to stop process \"{id}\": {source}")]
    Kill {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process \"{0}\" already exists")]
    AlreadyExists(String),
    #[error("process \"{id}\": {message}")]
    Failed { id: String, message: String },
    #[error("error stopping processes: {}", join_errors(.0))]
    Stop(Vec<ProcessError>),
}

fn join_errors(errors: &[ProcessError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A process whose lifecycle is owned by a [`crate::ProcessManager`]
///
/// `start` must be idempotent: a process added to an already started manager
/// may be started again after it was started elsewhere.
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    fn id(&self) -> &str;

    async fn start(&self) -> Result<(), ProcessError>;

    async fn stop(&self) -> Result<(), ProcessError>;
}

/// A process run through `tokio::process`
pub struct OsProcess {
    config: ProcessConfig,
    child: Mutex<Option<Child>>,
    started_at: parking_lot::Mutex<Option<DateTime<Utc>>>,
}

impl OsProcess {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            started_at: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// When the process was last started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        *self.started_at.lock()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.name);
        cmd.args(&self.config.args);
        if !self.config.cwd.is_empty() {
            cmd.current_dir(&self.config.cwd);
        }
        if self.config.log {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run_once(&self) -> Result<(), ProcessError> {
        let output = self
            .command()
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                id: self.config.id.clone(),
                source,
            })?;

        if self.config.log {
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                info!(process = %self.config.id, "{}", line);
            }
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                warn!(process = %self.config.id, "{}", line);
            }
        }

        if !output.status.success() {
            return Err(ProcessError::Exited {
                id: self.config.id.clone(),
                status: output.status.to_string(),
            });
        }
        *self.started_at.lock() = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ManagedProcess for OsProcess {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn start(&self) -> Result<(), ProcessError> {
        if self.config.one_shot {
            if self.started_at().is_some() {
                return Ok(());
            }
            debug!(process = %self.config.id, "Running one-shot process");
            return self.run_once().await;
        }

        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let mut child = self.command().spawn().map_err(|source| ProcessError::Spawn {
            id: self.config.id.clone(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(self.config.id.clone(), stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(self.config.id.clone(), stderr, true));
        }

        info!(
            process = %self.config.id,
            command = %self.config.name,
            pid = ?child.id(),
            "Started process"
        );
        *self.started_at.lock() = Some(Utc::now());
        *slot = Some(child);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!(process = %self.config.id, %status, "Process already exited");
            return Ok(());
        }

        child.kill().await.map_err(|source| ProcessError::Kill {
            id: self.config.id.clone(),
            source,
        })?;
        info!(process = %self.config.id, "Stopped process");
        Ok(())
    }
}

async fn forward_lines<R>(id: String, reader: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(process = %id, "{}", line);
        } else {
            info!(process = %id, "{}", line);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(id: &str, script: &str, one_shot: bool) -> OsProcess {
        OsProcess::new(ProcessConfig {
            id: id.to_string(),
            name: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: String::new(),
            one_shot,
            log: true,
        })
    }

    #[tokio::test]
    async fn test_one_shot_success() {
        let process = shell("ok", "echo hello", true);
        process.start().await.unwrap();
        let first = process.started_at();
        assert!(first.is_some());
        // Already ran, so a second start does not run it again
        process.start().await.unwrap();
        assert_eq!(process.started_at(), first);
    }

    #[tokio::test]
    async fn test_one_shot_failure() {
        let process = shell("bad", "exit 3", true);
        let err = process.start().await.unwrap_err();
        assert!(matches!(err, ProcessError::Exited { ref id, .. } if id == "bad"));
    }

    #[tokio::test]
    async fn test_long_running_start_stop() {
        let process = shell("sleeper", "sleep 30", false);
        process.start().await.unwrap();
        // Second start is a no-op
        process.start().await.unwrap();
        process.stop().await.unwrap();
        // Stopping a stopped process is fine
        process.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let process = OsProcess::new(ProcessConfig {
            id: "missing".to_string(),
            name: "/definitely/not/a/binary".to_string(),
            ..Default::default()
        });
        let err = process.start().await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
