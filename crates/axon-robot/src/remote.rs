//! The robot interface and handles for remote robots

use async_trait::async_trait;
use axon_core::RemoteConfig;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::proxy::{
    ArmHandle, BaseHandle, BoardHandle, CameraHandle, GripperHandle, LidarHandle, ProviderHandle,
    SensorHandle,
};

/// Name-based access to everything a robot exposes
///
/// Local robots and remote robots both implement this, so the graph can
/// search remotes with the same calls it serves its own callers with.
#[async_trait]
pub trait Robot: Send + Sync {
    fn remote_by_name(&self, name: &str) -> Option<Arc<dyn Robot>>;
    fn board_by_name(&self, name: &str) -> Option<BoardHandle>;
    fn arm_by_name(&self, name: &str) -> Option<ArmHandle>;
    fn base_by_name(&self, name: &str) -> Option<BaseHandle>;
    fn gripper_by_name(&self, name: &str) -> Option<GripperHandle>;
    fn camera_by_name(&self, name: &str) -> Option<CameraHandle>;
    fn lidar_by_name(&self, name: &str) -> Option<LidarHandle>;
    fn sensor_by_name(&self, name: &str) -> Option<SensorHandle>;
    fn provider_by_name(&self, name: &str) -> Option<ProviderHandle>;

    fn remote_names(&self) -> Vec<String>;
    fn board_names(&self) -> Vec<String>;
    fn arm_names(&self) -> Vec<String>;
    fn base_names(&self) -> Vec<String>;
    fn gripper_names(&self) -> Vec<String>;
    fn camera_names(&self) -> Vec<String>;
    fn lidar_names(&self) -> Vec<String>;
    fn sensor_names(&self) -> Vec<String>;
    fn provider_names(&self) -> Vec<String>;
    fn function_names(&self) -> Vec<String>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens connections to remote robots
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, address: &str) -> anyhow::Result<Arc<dyn Robot>>;
}

/// A connected remote robot as seen from the local graph
///
/// With `prefix` set, every name the remote reports is qualified as
/// `<remote>.<name>` and lookups only match qualified names.
pub struct RemoteRobot {
    inner: RwLock<RemoteInner>,
}

struct RemoteInner {
    config: RemoteConfig,
    robot: Arc<dyn Robot>,
}

impl RemoteRobot {
    pub fn new(robot: Arc<dyn Robot>, config: RemoteConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(RemoteInner { config, robot }),
        })
    }

    pub fn name(&self) -> String {
        self.inner.read().config.name.clone()
    }

    pub fn config(&self) -> RemoteConfig {
        self.inner.read().config.clone()
    }

    /// Snapshot of the connection currently behind this handle
    pub fn robot(&self) -> Arc<dyn Robot> {
        self.inner.read().robot.clone()
    }

    /// Take over the connection and config of `other`, returning the old
    /// connection
    pub(crate) fn replace(&self, other: &RemoteRobot) -> Arc<dyn Robot> {
        let (config, robot) = {
            let other = other.inner.read();
            (other.config.clone(), other.robot.clone())
        };
        let mut inner = self.inner.write();
        inner.config = config;
        std::mem::replace(&mut inner.robot, robot)
    }

    fn local_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        let inner = self.inner.read();
        if !inner.config.prefix {
            return Some(name);
        }
        name.strip_prefix(inner.config.name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
    }

    fn lookup<T>(&self, name: &str, find: impl FnOnce(&dyn Robot, &str) -> Option<T>) -> Option<T> {
        let name = self.local_name(name)?;
        find(self.robot().as_ref(), name)
    }

    fn names(&self, list: impl FnOnce(&dyn Robot) -> Vec<String>) -> Vec<String> {
        let (robot, prefix) = {
            let inner = self.inner.read();
            let prefix = inner.config.prefix.then(|| inner.config.name.clone());
            (inner.robot.clone(), prefix)
        };
        let names = list(robot.as_ref());
        match prefix {
            Some(prefix) => names.into_iter().map(|n| format!("{}.{}", prefix, n)).collect(),
            None => names,
        }
    }
}

impl std::fmt::Debug for RemoteRobot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRobot")
            .field("config", &self.inner.read().config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Robot for RemoteRobot {
    fn remote_by_name(&self, name: &str) -> Option<Arc<dyn Robot>> {
        self.lookup(name, |r, n| r.remote_by_name(n))
    }

    fn board_by_name(&self, name: &str) -> Option<BoardHandle> {
        self.lookup(name, |r, n| r.board_by_name(n))
    }

    fn arm_by_name(&self, name: &str) -> Option<ArmHandle> {
        self.lookup(name, |r, n| r.arm_by_name(n))
    }

    fn base_by_name(&self, name: &str) -> Option<BaseHandle> {
        self.lookup(name, |r, n| r.base_by_name(n))
    }

    fn gripper_by_name(&self, name: &str) -> Option<GripperHandle> {
        self.lookup(name, |r, n| r.gripper_by_name(n))
    }

    fn camera_by_name(&self, name: &str) -> Option<CameraHandle> {
        self.lookup(name, |r, n| r.camera_by_name(n))
    }

    fn lidar_by_name(&self, name: &str) -> Option<LidarHandle> {
        self.lookup(name, |r, n| r.lidar_by_name(n))
    }

    fn sensor_by_name(&self, name: &str) -> Option<SensorHandle> {
        self.lookup(name, |r, n| r.sensor_by_name(n))
    }

    fn provider_by_name(&self, name: &str) -> Option<ProviderHandle> {
        self.lookup(name, |r, n| r.provider_by_name(n))
    }

    fn remote_names(&self) -> Vec<String> {
        self.names(|r| r.remote_names())
    }

    fn board_names(&self) -> Vec<String> {
        self.names(|r| r.board_names())
    }

    fn arm_names(&self) -> Vec<String> {
        self.names(|r| r.arm_names())
    }

    fn base_names(&self) -> Vec<String> {
        self.names(|r| r.base_names())
    }

    fn gripper_names(&self) -> Vec<String> {
        self.names(|r| r.gripper_names())
    }

    fn camera_names(&self) -> Vec<String> {
        self.names(|r| r.camera_names())
    }

    fn lidar_names(&self) -> Vec<String> {
        self.names(|r| r.lidar_names())
    }

    fn sensor_names(&self) -> Vec<String> {
        self.names(|r| r.sensor_names())
    }

    fn provider_names(&self) -> Vec<String> {
        self.names(|r| r.provider_names())
    }

    fn function_names(&self) -> Vec<String> {
        self.names(|r| r.function_names())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.robot().close().await
    }
}
