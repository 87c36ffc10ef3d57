//! A robot running in this process

use async_trait::async_trait;
use axon_core::{Config, Diff};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::RobotError;
use crate::factory::ResourceFactory;
use crate::parts::RobotParts;
use crate::proxy::{
    ArmHandle, BaseHandle, BoardHandle, CameraHandle, GripperHandle, LidarHandle, ProviderHandle,
    SensorHandle,
};
use crate::remote::{RemoteConnector, Robot};

/// A robot built from config whose parts can be reconfigured while running
///
/// Readers always see a complete graph: reconfiguration prepares a new
/// graph on the side and swaps it in under a short write lock.
pub struct LocalRobot {
    parts: RwLock<RobotParts>,
    config: RwLock<Config>,
    factory: Arc<dyn ResourceFactory>,
    connector: Arc<dyn RemoteConnector>,
    reconfiguring: Mutex<()>,
}

impl LocalRobot {
    /// Build every part of `config`, closing whatever was built if any part
    /// fails.
    pub async fn new(
        config: Config,
        factory: Arc<dyn ResourceFactory>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Result<Self, RobotError> {
        let mut parts = RobotParts::new();
        if let Err(e) = parts
            .process_config(&config, factory.as_ref(), connector.as_ref())
            .await
        {
            close_staged("partial robot", &parts).await;
            return Err(e);
        }
        info!(
            components = config.components.len(),
            boards = config.boards.len(),
            remotes = config.remotes.len(),
            "Robot started"
        );

        Ok(Self {
            parts: RwLock::new(parts),
            config: RwLock::new(config),
            factory,
            connector,
            reconfiguring: Mutex::new(()),
        })
    }

    /// The config the robot is currently running
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Shallow copy of the current graph
    pub fn parts(&self) -> RobotParts {
        self.parts.read().clone()
    }

    /// Move the robot to `new_config`, given the diff from the current one.
    ///
    /// Everything the diff adds or modifies is built before the live graph
    /// is touched; a build failure closes what was built and leaves the
    /// robot as it was. Removed parts are closed after the new graph is in
    /// place. Reconfigurations are serialized.
    pub async fn reconfigure(&self, new_config: Config, diff: &Diff) -> Result<(), RobotError> {
        let _guard = self.reconfiguring.lock().await;
        if diff.is_empty() {
            *self.config.write() = new_config;
            return Ok(());
        }

        let factory = self.factory.as_ref();
        let connector = self.connector.as_ref();

        let mut to_add = RobotParts::new();
        if let Err(e) = to_add.process_config(&diff.added, factory, connector).await {
            close_staged("added parts", &to_add).await;
            return Err(e);
        }

        let mut to_modify = RobotParts::new();
        if let Err(e) = to_modify
            .process_modified_config(&diff.modified, factory, connector)
            .await
        {
            close_staged("added parts", &to_add).await;
            close_staged("modified parts", &to_modify).await;
            return Err(e);
        }

        let mut draft = self.parts.read().clone();
        let to_remove = match draft.filter_from_config(&diff.removed).await {
            Ok(parts) => parts,
            Err(e) => {
                close_staged("added parts", &to_add).await;
                close_staged("modified parts", &to_modify).await;
                return Err(e);
            }
        };

        let add_result = match draft.merge_add(&to_add).await {
            Ok(result) => result,
            Err(e) => {
                close_staged("added parts", &to_add).await;
                close_staged("modified parts", &to_modify).await;
                return Err(e);
            }
        };
        let modify_result = match draft.merge_modify(&to_modify, diff).await {
            Ok(result) => result,
            Err(e) => {
                close_staged("added parts", &to_add).await;
                close_staged("modified parts", &to_modify).await;
                return Err(e);
            }
        };
        draft.merge_remove(&to_remove);

        *self.parts.write() = draft;
        *self.config.write() = new_config;
        info!(
            added = diff.added.components.len() + diff.added.boards.len(),
            modified = diff.modified.components.len() + diff.modified.boards.len(),
            removed = diff.removed.components.len() + diff.removed.boards.len(),
            "Robot reconfigured"
        );

        let handed_off = match add_result.process(&to_remove).await {
            Ok(()) => modify_result.process(&to_remove).await,
            Err(e) => Err(e),
        };
        let closed = to_remove.close().await;
        handed_off?;
        closed
    }

    /// Close every part of the robot
    ///
    /// Waits for a reconfiguration in progress so the parts it builds are
    /// closed too.
    pub async fn close(&self) -> Result<(), RobotError> {
        let _guard = self.reconfiguring.lock().await;
        let parts = self.parts.read().clone();
        parts.close().await
    }
}

async fn close_staged(what: &str, parts: &RobotParts) {
    if let Err(e) = parts.close().await {
        warn!(error = %e, "Failed to close staged {}", what);
    }
}

#[async_trait]
impl Robot for LocalRobot {
    fn remote_by_name(&self, name: &str) -> Option<Arc<dyn Robot>> {
        self.parts.read().remote_by_name(name)
    }

    fn board_by_name(&self, name: &str) -> Option<BoardHandle> {
        self.parts.read().board_by_name(name)
    }

    fn arm_by_name(&self, name: &str) -> Option<ArmHandle> {
        self.parts.read().arm_by_name(name)
    }

    fn base_by_name(&self, name: &str) -> Option<BaseHandle> {
        self.parts.read().base_by_name(name)
    }

    fn gripper_by_name(&self, name: &str) -> Option<GripperHandle> {
        self.parts.read().gripper_by_name(name)
    }

    fn camera_by_name(&self, name: &str) -> Option<CameraHandle> {
        self.parts.read().camera_by_name(name)
    }

    fn lidar_by_name(&self, name: &str) -> Option<LidarHandle> {
        self.parts.read().lidar_by_name(name)
    }

    fn sensor_by_name(&self, name: &str) -> Option<SensorHandle> {
        self.parts.read().sensor_by_name(name)
    }

    fn provider_by_name(&self, name: &str) -> Option<ProviderHandle> {
        self.parts.read().provider_by_name(name)
    }

    fn remote_names(&self) -> Vec<String> {
        self.parts.read().remote_names()
    }

    fn board_names(&self) -> Vec<String> {
        self.parts.read().board_names()
    }

    fn arm_names(&self) -> Vec<String> {
        self.parts.read().arm_names()
    }

    fn base_names(&self) -> Vec<String> {
        self.parts.read().base_names()
    }

    fn gripper_names(&self) -> Vec<String> {
        self.parts.read().gripper_names()
    }

    fn camera_names(&self) -> Vec<String> {
        self.parts.read().camera_names()
    }

    fn lidar_names(&self) -> Vec<String> {
        self.parts.read().lidar_names()
    }

    fn sensor_names(&self) -> Vec<String> {
        self.parts.read().sensor_names()
    }

    fn provider_names(&self) -> Vec<String> {
        self.parts.read().provider_names()
    }

    fn function_names(&self) -> Vec<String> {
        self.parts.read().function_names()
    }

    async fn close(&self) -> anyhow::Result<()> {
        LocalRobot::close(self).await?;
        Ok(())
    }
}
