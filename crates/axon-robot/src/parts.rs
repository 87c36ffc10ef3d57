//! The resource graph of a robot
//!
//! [`RobotParts`] holds one proxy per live resource, grouped by kind, plus
//! the connected remotes, function names and the process manager. A robot
//! builds its parts from config, answers lookups through them and, on
//! reconfiguration, merges freshly built parts into a copy of them.

use async_trait::async_trait;
use axon_core::{
    BoardConfig, Component, ComponentType, Config, ModifiedConfigDiff, ProcessConfig, RemoteConfig,
};
use axon_process::ProcessManager;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CloseErrors, CloseFailure, RobotError};
use crate::factory::{Part, ResourceFactory};
use crate::proxy::{
    ArmHandle, BaseHandle, BoardHandle, BoardProxy, CameraHandle, GripperHandle, LidarHandle,
    ProviderHandle, ResourceProxy, SensorHandle,
};
use crate::remote::{RemoteConnector, RemoteRobot, Robot};
use crate::resource::{Arm, Base, Board, Camera, Gripper, Lidar, Provider, Sensor};

/// Every resource, remote, function and process of a robot
///
/// Cloning is shallow: the clone has its own maps and process bookkeeping
/// but shares every proxy, so swapping an instance behind a proxy is seen
/// through both.
#[derive(Debug, Clone, Default)]
pub struct RobotParts {
    pub(crate) remotes: BTreeMap<String, Arc<RemoteRobot>>,
    pub(crate) boards: BTreeMap<String, BoardHandle>,
    pub(crate) arms: BTreeMap<String, ArmHandle>,
    pub(crate) bases: BTreeMap<String, BaseHandle>,
    pub(crate) grippers: BTreeMap<String, GripperHandle>,
    pub(crate) cameras: BTreeMap<String, CameraHandle>,
    pub(crate) lidars: BTreeMap<String, LidarHandle>,
    pub(crate) sensors: BTreeMap<String, SensorHandle>,
    pub(crate) providers: BTreeMap<String, ProviderHandle>,
    pub(crate) functions: BTreeSet<String>,
    pub(crate) process_manager: ProcessManager,
}

impl RobotParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_manager(&self) -> &ProcessManager {
        &self.process_manager
    }

    pub fn add_remote(&mut self, remote: Arc<RemoteRobot>) {
        self.remotes.insert(remote.name(), remote);
    }

    pub fn add_board(&mut self, name: &str, board: Arc<dyn Board>) {
        self.boards.insert(name.to_string(), BoardProxy::new(board));
    }

    pub fn add_arm(&mut self, name: &str, arm: Arc<dyn Arm>) {
        self.arms.insert(name.to_string(), ResourceProxy::new(arm));
    }

    pub fn add_base(&mut self, name: &str, base: Arc<dyn Base>) {
        self.bases.insert(name.to_string(), ResourceProxy::new(base));
    }

    pub fn add_gripper(&mut self, name: &str, gripper: Arc<dyn Gripper>) {
        self.grippers.insert(name.to_string(), ResourceProxy::new(gripper));
    }

    pub fn add_camera(&mut self, name: &str, camera: Arc<dyn Camera>) {
        self.cameras.insert(name.to_string(), ResourceProxy::new(camera));
    }

    pub fn add_lidar(&mut self, name: &str, lidar: Arc<dyn Lidar>) {
        self.lidars.insert(name.to_string(), ResourceProxy::new(lidar));
    }

    /// Register a sensor under the richest capability it advertises
    pub fn add_sensor(&mut self, name: &str, sensor: Arc<dyn Sensor>) {
        self.sensors.insert(name.to_string(), SensorHandle::new(sensor));
    }

    pub fn add_provider(&mut self, name: &str, provider: Arc<dyn Provider>) {
        self.providers.insert(name.to_string(), ResourceProxy::new(provider));
    }

    pub fn add_function(&mut self, name: &str) {
        self.functions.insert(name.to_string());
    }

    pub fn add_part(&mut self, name: &str, part: Part) {
        match part {
            Part::Arm(arm) => self.add_arm(name, arm),
            Part::Base(base) => self.add_base(name, base),
            Part::Gripper(gripper) => self.add_gripper(name, gripper),
            Part::Camera(camera) => self.add_camera(name, camera),
            Part::Lidar(lidar) => self.add_lidar(name, lidar),
            Part::Sensor(sensor) => self.add_sensor(name, sensor),
            Part::Provider(provider) => self.add_provider(name, provider),
        }
    }

    /// Build every part described by `config`.
    ///
    /// Processes are started first, then remotes are connected, then boards
    /// are constructed, then providers, then every other component in config
    /// order, and finally function names are recorded. The first failure
    /// aborts the build; whatever was built so far stays in `self`.
    pub async fn process_config(
        &mut self,
        config: &Config,
        factory: &dyn ResourceFactory,
        connector: &dyn RemoteConnector,
    ) -> Result<(), RobotError> {
        self.new_processes(&config.processes).await?;
        self.new_remotes(&config.remotes, connector).await?;
        self.new_boards(&config.boards, factory).await?;
        self.new_components(&config.components, factory).await?;
        for function in &config.functions {
            self.add_function(&function.name);
        }
        Ok(())
    }

    /// Build the replacement parts for the modified portion of a diff
    ///
    /// Boards are rebuilt from their sub-resource diffs applied to the
    /// running board config.
    pub async fn process_modified_config(
        &mut self,
        diff: &ModifiedConfigDiff,
        factory: &dyn ResourceFactory,
        connector: &dyn RemoteConnector,
    ) -> Result<(), RobotError> {
        self.new_processes(&diff.processes).await?;
        self.new_remotes(&diff.remotes, connector).await?;
        for (name, board_diff) in &diff.boards {
            let config = board_diff.to_config()?;
            let board = construct_board(factory, &config).await?;
            self.add_board(name, board);
        }
        self.new_components(&diff.components, factory).await?;
        for function in &diff.functions {
            self.add_function(&function.name);
        }
        Ok(())
    }

    async fn new_processes(&mut self, processes: &[ProcessConfig]) -> Result<(), RobotError> {
        for process in processes {
            self.process_manager.add_process_from_config(process).await?;
        }
        self.process_manager.start().await?;
        Ok(())
    }

    async fn new_remotes(
        &mut self,
        remotes: &[RemoteConfig],
        connector: &dyn RemoteConnector,
    ) -> Result<(), RobotError> {
        for config in remotes {
            let robot = connector.connect(&config.address).await.map_err(|source| {
                RobotError::RemoteConnect {
                    address: config.address.clone(),
                    source,
                }
            })?;
            info!(remote = %config.name, address = %config.address, "Connected to remote robot");
            self.add_remote(RemoteRobot::new(robot, config.clone()));
        }
        Ok(())
    }

    async fn new_boards(
        &mut self,
        boards: &[BoardConfig],
        factory: &dyn ResourceFactory,
    ) -> Result<(), RobotError> {
        for config in boards {
            let board = construct_board(factory, config).await?;
            self.add_board(&config.name, board);
        }
        Ok(())
    }

    async fn new_components(
        &mut self,
        components: &[Component],
        factory: &dyn ResourceFactory,
    ) -> Result<(), RobotError> {
        let (providers, others): (Vec<&Component>, Vec<&Component>) = components
            .iter()
            .partition(|c| c.r#type == ComponentType::Provider);
        for component in providers.into_iter().chain(others) {
            let part = Part::construct(factory, component).await?;
            self.add_part(&component.name, part);
        }
        Ok(())
    }

    fn find_in_remotes<T>(&self, find: impl Fn(&RemoteRobot) -> Option<T>) -> Option<T> {
        self.remotes.values().find_map(|remote| find(remote.as_ref()))
    }

    /// Local names followed by remote names not already seen
    fn with_remote_names(
        &self,
        local: impl Iterator<Item = String>,
        list: impl Fn(&RemoteRobot) -> Vec<String>,
    ) -> Vec<String> {
        let mut names: Vec<String> = local.collect();
        let mut seen: HashSet<String> = names.iter().cloned().collect();
        for remote in self.remotes.values() {
            for name in list(remote.as_ref()) {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Close every part, continuing past failures.
    ///
    /// The process manager is stopped first, then remotes, arms, grippers,
    /// cameras, lidars, bases, boards, sensors and providers are closed.
    /// Every failure is reported in one combined error.
    pub async fn close(&self) -> Result<(), RobotError> {
        let mut failures = Vec::new();

        if let Err(e) = self.process_manager.stop().await {
            record(&mut failures, "process manager".to_string(), Err(e.into()));
        }
        for (name, remote) in &self.remotes {
            record(&mut failures, format!("remote \"{}\"", name), remote.close().await);
        }
        for (name, arm) in &self.arms {
            record(&mut failures, format!("arm \"{}\"", name), arm.close().await);
        }
        for (name, gripper) in &self.grippers {
            record(&mut failures, format!("gripper \"{}\"", name), gripper.close().await);
        }
        for (name, camera) in &self.cameras {
            record(&mut failures, format!("camera \"{}\"", name), camera.close().await);
        }
        for (name, lidar) in &self.lidars {
            record(&mut failures, format!("lidar \"{}\"", name), lidar.close().await);
        }
        for (name, base) in &self.bases {
            record(&mut failures, format!("base \"{}\"", name), base.close().await);
        }
        for (name, board) in &self.boards {
            record(&mut failures, format!("board \"{}\"", name), board.close().await);
        }
        for (name, sensor) in &self.sensors {
            record(&mut failures, format!("sensor \"{}\"", name), sensor.close().await);
        }
        for (name, provider) in &self.providers {
            record(&mut failures, format!("provider \"{}\"", name), provider.close().await);
        }

        if failures.is_empty() {
            debug!("Closed robot parts");
            Ok(())
        } else {
            Err(CloseErrors(failures).into())
        }
    }
}

async fn construct_board(
    factory: &dyn ResourceFactory,
    config: &BoardConfig,
) -> Result<Arc<dyn Board>, RobotError> {
    factory
        .new_board(config)
        .await
        .map_err(|source| RobotError::Construct {
            kind: "board".to_string(),
            name: config.name.clone(),
            source,
        })
}

fn record(failures: &mut Vec<CloseFailure>, target: String, result: anyhow::Result<()>) {
    if let Err(error) = result {
        warn!(resource = %target, error = %error, "Failed to close");
        failures.push(CloseFailure { target, error });
    }
}

#[async_trait]
impl Robot for RobotParts {
    fn remote_by_name(&self, name: &str) -> Option<Arc<dyn Robot>> {
        if let Some(remote) = self.remotes.get(name) {
            let remote: Arc<dyn Robot> = remote.clone();
            return Some(remote);
        }
        self.find_in_remotes(|r| r.remote_by_name(name))
    }

    fn board_by_name(&self, name: &str) -> Option<BoardHandle> {
        self.boards
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.board_by_name(name)))
    }

    fn arm_by_name(&self, name: &str) -> Option<ArmHandle> {
        self.arms
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.arm_by_name(name)))
    }

    fn base_by_name(&self, name: &str) -> Option<BaseHandle> {
        self.bases
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.base_by_name(name)))
    }

    fn gripper_by_name(&self, name: &str) -> Option<GripperHandle> {
        self.grippers
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.gripper_by_name(name)))
    }

    fn camera_by_name(&self, name: &str) -> Option<CameraHandle> {
        self.cameras
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.camera_by_name(name)))
    }

    fn lidar_by_name(&self, name: &str) -> Option<LidarHandle> {
        self.lidars
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.lidar_by_name(name)))
    }

    fn sensor_by_name(&self, name: &str) -> Option<SensorHandle> {
        self.sensors
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.sensor_by_name(name)))
    }

    fn provider_by_name(&self, name: &str) -> Option<ProviderHandle> {
        self.providers
            .get(name)
            .cloned()
            .or_else(|| self.find_in_remotes(|r| r.provider_by_name(name)))
    }

    fn remote_names(&self) -> Vec<String> {
        self.with_remote_names(self.remotes.keys().cloned(), |r| r.remote_names())
    }

    fn board_names(&self) -> Vec<String> {
        self.with_remote_names(self.boards.keys().cloned(), |r| r.board_names())
    }

    fn arm_names(&self) -> Vec<String> {
        self.with_remote_names(self.arms.keys().cloned(), |r| r.arm_names())
    }

    fn base_names(&self) -> Vec<String> {
        self.with_remote_names(self.bases.keys().cloned(), |r| r.base_names())
    }

    fn gripper_names(&self) -> Vec<String> {
        self.with_remote_names(self.grippers.keys().cloned(), |r| r.gripper_names())
    }

    fn camera_names(&self) -> Vec<String> {
        self.with_remote_names(self.cameras.keys().cloned(), |r| r.camera_names())
    }

    fn lidar_names(&self) -> Vec<String> {
        self.with_remote_names(self.lidars.keys().cloned(), |r| r.lidar_names())
    }

    fn sensor_names(&self) -> Vec<String> {
        self.with_remote_names(self.sensors.keys().cloned(), |r| r.sensor_names())
    }

    fn provider_names(&self) -> Vec<String> {
        self.with_remote_names(self.providers.keys().cloned(), |r| r.provider_names())
    }

    fn function_names(&self) -> Vec<String> {
        self.with_remote_names(self.functions.iter().cloned(), |r| r.function_names())
    }

    async fn close(&self) -> anyhow::Result<()> {
        RobotParts::close(self).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeArm, FakeBoard, FakeCamera, FakeConnector, FakeFactory};
    use axon_core::FunctionConfig;
    use parking_lot::Mutex;

    fn arm(name: &str) -> Component {
        Component::new(name, ComponentType::Arm)
    }

    fn remote_config(name: &str, prefix: bool) -> RemoteConfig {
        RemoteConfig {
            name: name.to_string(),
            address: format!("{}:8080", name),
            prefix,
            parent: String::new(),
        }
    }

    fn remote_with_arms(name: &str, prefix: bool, arms: &[&str]) -> Arc<RemoteRobot> {
        let mut parts = RobotParts::new();
        for a in arms {
            parts.add_arm(a, FakeArm::new(a));
        }
        RemoteRobot::new(Arc::new(parts), remote_config(name, prefix))
    }

    /// Records the order in which components are constructed
    #[derive(Default)]
    struct RecordingFactory {
        inner: FakeFactory,
        order: Mutex<Vec<String>>,
    }

    impl RecordingFactory {
        fn note(&self, name: &str) {
            self.order.lock().push(name.to_string());
        }
    }

    #[async_trait]
    impl ResourceFactory for RecordingFactory {
        async fn new_board(&self, config: &BoardConfig) -> anyhow::Result<Arc<dyn Board>> {
            self.note(&config.name);
            self.inner.new_board(config).await
        }

        async fn new_arm(&self, config: &Component) -> anyhow::Result<Arc<dyn Arm>> {
            self.note(&config.name);
            self.inner.new_arm(config).await
        }

        async fn new_base(&self, config: &Component) -> anyhow::Result<Arc<dyn Base>> {
            self.note(&config.name);
            self.inner.new_base(config).await
        }

        async fn new_gripper(&self, config: &Component) -> anyhow::Result<Arc<dyn Gripper>> {
            self.note(&config.name);
            self.inner.new_gripper(config).await
        }

        async fn new_camera(&self, config: &Component) -> anyhow::Result<Arc<dyn Camera>> {
            self.note(&config.name);
            self.inner.new_camera(config).await
        }

        async fn new_lidar(&self, config: &Component) -> anyhow::Result<Arc<dyn Lidar>> {
            self.note(&config.name);
            self.inner.new_lidar(config).await
        }

        async fn new_sensor(
            &self,
            config: &Component,
            sub_type: &str,
        ) -> anyhow::Result<Arc<dyn Sensor>> {
            self.note(&config.name);
            self.inner.new_sensor(config, sub_type).await
        }

        async fn new_provider(&self, config: &Component) -> anyhow::Result<Arc<dyn Provider>> {
            self.note(&config.name);
            self.inner.new_provider(config).await
        }
    }

    #[tokio::test]
    async fn test_process_config_builds_every_kind() {
        let config = Config {
            boards: vec![BoardConfig::new("board1")],
            components: vec![
                arm("arm1"),
                Component::new("base1", ComponentType::Base),
                Component::new("gripper1", ComponentType::Gripper),
                Component::new("cam1", ComponentType::Camera),
                Component::new("lidar1", ComponentType::Lidar),
                Component::new("compass1", ComponentType::Sensor).with_sub_type("compass"),
                Component::new("gps1", ComponentType::Provider),
            ],
            functions: vec![FunctionConfig {
                name: "func1".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let mut parts = RobotParts::new();
        parts
            .process_config(&config, &FakeFactory::new(), &FakeConnector::new())
            .await
            .unwrap();

        assert_eq!(parts.board_names(), vec!["board1"]);
        assert_eq!(parts.arm_names(), vec!["arm1"]);
        assert_eq!(parts.base_names(), vec!["base1"]);
        assert_eq!(parts.gripper_names(), vec!["gripper1"]);
        assert_eq!(parts.camera_names(), vec!["cam1"]);
        assert_eq!(parts.lidar_names(), vec!["lidar1"]);
        assert_eq!(parts.sensor_names(), vec!["compass1"]);
        assert_eq!(parts.provider_names(), vec!["gps1"]);
        assert_eq!(parts.function_names(), vec!["func1"]);
        assert!(parts.sensor_by_name("compass1").unwrap().heading().await.is_ok());
    }

    #[tokio::test]
    async fn test_providers_are_constructed_first() {
        let config = Config {
            boards: vec![BoardConfig::new("board1")],
            components: vec![
                arm("arm1"),
                Component::new("gps1", ComponentType::Provider),
                Component::new("base1", ComponentType::Base),
                Component::new("odom", ComponentType::Provider),
            ],
            ..Default::default()
        };

        let factory = RecordingFactory::default();
        let mut parts = RobotParts::new();
        parts
            .process_config(&config, &factory, &FakeConnector::new())
            .await
            .unwrap();
        assert_eq!(
            *factory.order.lock(),
            vec!["board1", "gps1", "odom", "arm1", "base1"]
        );
    }

    #[tokio::test]
    async fn test_sensor_without_subtype_fails() {
        let config = Config {
            components: vec![Component::new("imu", ComponentType::Sensor)],
            ..Default::default()
        };
        let mut parts = RobotParts::new();
        let err = parts
            .process_config(&config, &FakeFactory::new(), &FakeConnector::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RobotError::MissingSubtype(name) if name == "imu"));
    }

    #[tokio::test]
    async fn test_board_typed_component_is_unknown() {
        for kind in [ComponentType::Board, ComponentType::Other("servo".to_string())] {
            let config = Config {
                components: vec![Component::new("thing", kind)],
                ..Default::default()
            };
            let mut parts = RobotParts::new();
            let err = parts
                .process_config(&config, &FakeFactory::new(), &FakeConnector::new())
                .await
                .unwrap_err();
            assert!(matches!(err, RobotError::UnknownComponentType { ref name, .. } if name == "thing"));
        }
    }

    #[tokio::test]
    async fn test_constructor_failure_aborts_build() {
        let config = Config {
            components: vec![arm("arm1"), arm("arm2").with_model("warp-drive")],
            ..Default::default()
        };
        let mut parts = RobotParts::new();
        let err = parts
            .process_config(&config, &FakeFactory::new(), &FakeConnector::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RobotError::Construct { ref name, .. } if name == "arm2"));
        // Parts built before the failure stay behind for the caller to close
        assert_eq!(parts.arm_names(), vec!["arm1"]);
    }

    #[tokio::test]
    async fn test_remote_connect_failure() {
        let config = Config {
            remotes: vec![remote_config("nowhere", false)],
            ..Default::default()
        };
        let mut parts = RobotParts::new();
        let err = parts
            .process_config(&config, &FakeFactory::new(), &FakeConnector::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RobotError::RemoteConnect { ref address, .. } if address == "nowhere:8080"));
    }

    #[tokio::test]
    async fn test_remotes_connected_through_connector() {
        let mut remote = RobotParts::new();
        remote.add_arm("arm9", FakeArm::new("arm9"));
        let connector = FakeConnector::new().with_robot("left:8080", Arc::new(remote));

        let config = Config {
            remotes: vec![remote_config("left", true)],
            ..Default::default()
        };
        let mut parts = RobotParts::new();
        parts
            .process_config(&config, &FakeFactory::new(), &connector)
            .await
            .unwrap();
        assert_eq!(parts.remote_names(), vec!["left"]);
        assert_eq!(parts.arm_names(), vec!["left.arm9"]);
    }

    #[test]
    fn test_lookup_prefers_local_then_remotes_in_order() {
        let mut parts = RobotParts::new();
        let local = FakeArm::new("arm1");
        parts.add_arm("arm1", local.clone());
        parts.add_remote(remote_with_arms("a", false, &["arm1", "arm2"]));
        parts.add_remote(remote_with_arms("b", false, &["arm2", "arm3"]));

        let local_dyn: Arc<dyn Arm> = local;
        assert!(Arc::ptr_eq(&parts.arm_by_name("arm1").unwrap().actual(), &local_dyn));

        let from_a = parts.remote_by_name("a").unwrap().arm_by_name("arm2").unwrap();
        assert!(Arc::ptr_eq(&parts.arm_by_name("arm2").unwrap(), &from_a));
        assert!(parts.arm_by_name("arm3").is_some());
        assert!(parts.arm_by_name("arm4").is_none());
    }

    #[test]
    fn test_names_are_deduplicated_across_remotes() {
        let mut parts = RobotParts::new();
        parts.add_arm("arm1", FakeArm::new("arm1"));
        parts.add_remote(remote_with_arms("a", false, &["arm1", "arm2"]));
        parts.add_remote(remote_with_arms("b", false, &["arm2", "arm3"]));
        parts.add_remote(remote_with_arms("c", true, &["arm1"]));

        assert_eq!(parts.arm_names(), vec!["arm1", "arm2", "arm3", "c.arm1"]);
        assert_eq!(parts.remote_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nested_remote_lookup() {
        let mut middle = RobotParts::new();
        middle.add_remote(remote_with_arms("inner", false, &["deep"]));
        let mut parts = RobotParts::new();
        parts.add_remote(RemoteRobot::new(Arc::new(middle), remote_config("outer", false)));

        assert!(parts.remote_by_name("inner").is_some());
        assert!(parts.arm_by_name("deep").is_some());
        assert_eq!(parts.remote_names(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_clone_is_shallow() {
        let mut parts = RobotParts::new();
        parts.add_arm("arm1", FakeArm::new("arm1"));
        parts.add_function("func1");

        let mut cloned = parts.clone();
        cloned.add_arm("arm2", FakeArm::new("arm2"));
        cloned.functions.clear();

        assert_eq!(parts.arm_names(), vec!["arm1"]);
        assert_eq!(parts.function_names(), vec!["func1"]);
        assert!(Arc::ptr_eq(
            &parts.arm_by_name("arm1").unwrap(),
            &cloned.arm_by_name("arm1").unwrap()
        ));
    }

    #[tokio::test]
    async fn test_close_reports_every_failure() {
        let mut parts = RobotParts::new();
        let good = FakeArm::new("good");
        let bad_arm = FakeArm::new("bad").failing_close();
        let bad_camera = FakeCamera::new("cam").failing_close();
        parts.add_arm("good", good.clone());
        parts.add_arm("bad", bad_arm.clone());
        parts.add_camera("cam", bad_camera.clone());

        let err = parts.close().await.unwrap_err();
        let RobotError::Close(errors) = &err else {
            panic!("expected combined close error, got {err}");
        };
        assert_eq!(errors.failures().len(), 2);
        let message = err.to_string();
        assert!(message.contains("arm \"bad\""));
        assert!(message.contains("camera \"cam\""));
        assert!(good.is_closed());
        assert!(bad_arm.is_closed());
        assert!(bad_camera.is_closed());
    }

    struct StubbornProcess;

    #[async_trait]
    impl axon_process::ManagedProcess for StubbornProcess {
        fn id(&self) -> &str {
            "stubborn"
        }

        async fn start(&self) -> Result<(), axon_process::ProcessError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), axon_process::ProcessError> {
            Err(axon_process::ProcessError::Failed {
                id: "stubborn".to_string(),
                message: "will not stop".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_close_continues_past_board_and_process_failures() {
        let mut board_config = BoardConfig::new("board1");
        board_config
            .attributes
            .insert("fail_close".to_string(), serde_json::Value::Bool(true));

        let mut parts = RobotParts::new();
        parts
            .process_manager()
            .add_process(Arc::new(StubbornProcess), false)
            .await
            .unwrap();
        parts.add_board("board1", FakeBoard::new(&board_config));
        let camera = FakeCamera::new("cam1");
        parts.add_camera("cam1", camera.clone());

        let err = parts.close().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("process manager"));
        assert!(message.contains("will not stop"));
        assert!(message.contains("board \"board1\""));
        assert!(camera.is_closed());
    }

    #[test]
    fn test_reregistering_actual_does_not_nest() {
        let mut parts = RobotParts::new();
        let arm = FakeArm::new("arm1");
        parts.add_arm("arm1", arm.clone());

        let handle = parts.arm_by_name("arm1").unwrap();
        let mut other = RobotParts::new();
        other.add_arm("arm1", handle.actual());

        let arm_dyn: Arc<dyn Arm> = arm;
        let rewrapped = other.arm_by_name("arm1").unwrap();
        assert!(!Arc::ptr_eq(&handle, &rewrapped));
        assert!(Arc::ptr_eq(&rewrapped.actual(), &arm_dyn));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_processes_start_before_components() {
        let config = Config {
            processes: vec![ProcessConfig {
                id: "setup".to_string(),
                name: "true".to_string(),
                one_shot: true,
                ..Default::default()
            }],
            components: vec![arm("arm1")],
            ..Default::default()
        };
        let mut parts = RobotParts::new();
        parts
            .process_config(&config, &FakeFactory::new(), &FakeConnector::new())
            .await
            .unwrap();
        assert!(parts.process_manager().is_started());
        assert_eq!(parts.process_manager().process_ids(), vec!["setup"]);
        parts.close().await.unwrap();
    }
}
