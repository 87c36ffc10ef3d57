//! Merging staged parts into a graph
//!
//! A reconfiguration builds three graphs from a diff: parts to add, parts
//! replacing running ones, and the running parts to remove. They are merged
//! into a copy of the live graph in that order.

use axon_core::{ComponentType, Config, Diff};
use axon_process::{ManagedProcess, ProcessError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::RobotError;
use crate::parts::RobotParts;
use crate::proxy::{BoardHandle, CloseFuture, ResourceProxy, SensorHandle};
use crate::remote::{RemoteRobot, Robot};
use crate::resource::{Arm, Base, Board, Camera, Gripper, Lidar, Provider};

/// Processes displaced by a merge
///
/// The displaced processes are no longer managed by the merged graph and
/// must be handed to the graph that is about to be closed.
#[derive(Default)]
pub struct PartsMergeResult {
    replaced_processes: Vec<Arc<dyn ManagedProcess>>,
}

impl PartsMergeResult {
    pub fn replaced_processes(&self) -> &[Arc<dyn ManagedProcess>] {
        &self.replaced_processes
    }

    /// Move every replaced process into `parts`
    pub async fn process(&self, parts: &RobotParts) -> Result<(), RobotError> {
        for process in &self.replaced_processes {
            match parts.process_manager.add_process(process.clone(), false).await {
                Ok(None) => {}
                Ok(Some(existing)) => {
                    return Err(RobotError::UnexpectedProcessReplacement(existing.id().to_string()))
                }
                Err(ProcessError::AlreadyExists(id)) => {
                    return Err(RobotError::UnexpectedProcessReplacement(id))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PartsMergeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.replaced_processes.iter().map(|p| p.id()).collect();
        f.debug_struct("PartsMergeResult")
            .field("replaced_processes", &ids)
            .finish()
    }
}

/// Replacements resolved against a graph, ready to be swapped in
#[derive(Default)]
pub(crate) struct StagedModify {
    remotes: Vec<(Arc<RemoteRobot>, Arc<RemoteRobot>)>,
    boards: Vec<(String, BoardHandle, Arc<dyn Board>)>,
    arms: Vec<(Arc<ResourceProxy<dyn Arm>>, Arc<dyn Arm>)>,
    bases: Vec<(Arc<ResourceProxy<dyn Base>>, Arc<dyn Base>)>,
    grippers: Vec<(Arc<ResourceProxy<dyn Gripper>>, Arc<dyn Gripper>)>,
    cameras: Vec<(Arc<ResourceProxy<dyn Camera>>, Arc<dyn Camera>)>,
    lidars: Vec<(Arc<ResourceProxy<dyn Lidar>>, Arc<dyn Lidar>)>,
    sensors: Vec<(SensorHandle, SensorHandle)>,
    providers: Vec<(Arc<ResourceProxy<dyn Provider>>, Arc<dyn Provider>)>,
}

impl StagedModify {
    /// Swap every staged replacement in, returning the closes of the
    /// instances that were swapped out. Cannot fail.
    pub(crate) fn commit(self, diff: &Diff) -> Vec<CloseFuture> {
        let mut retired = Vec::new();

        for (live, next) in self.remotes {
            let incoming = next.robot();
            let old = live.replace(&next);
            if !Arc::ptr_eq(&old, &incoming) {
                let close: CloseFuture = Box::pin(async move { old.close().await });
                retired.push(close);
            }
        }
        for (name, live, next) in self.boards {
            let close = match diff.modified.boards.get(&name) {
                Some(board_diff) => live.merge(next, board_diff),
                None => live.replace(next),
            };
            retired.extend(close);
        }
        for (live, next) in self.arms {
            retired.extend(live.swap(next));
        }
        for (live, next) in self.bases {
            retired.extend(live.swap(next));
        }
        for (live, next) in self.grippers {
            retired.extend(live.swap(next));
        }
        for (live, next) in self.cameras {
            retired.extend(live.swap(next));
        }
        for (live, next) in self.lidars {
            retired.extend(live.swap(next));
        }
        for (live, next) in self.sensors {
            retired.extend(live.swap_from(&next));
        }
        for (live, next) in self.providers {
            retired.extend(live.swap(next));
        }

        retired
    }
}

fn skip_missing(kind: &str, name: &str) {
    warn!(kind, name, "Modified resource is not running, skipping");
}

fn stage_proxies<T: ?Sized>(
    kind: &str,
    live: &BTreeMap<String, Arc<ResourceProxy<T>>>,
    incoming: &BTreeMap<String, Arc<ResourceProxy<T>>>,
) -> Vec<(Arc<ResourceProxy<T>>, Arc<T>)> {
    incoming
        .iter()
        .filter_map(|(name, proxy)| match live.get(name) {
            Some(target) => Some((target.clone(), proxy.actual())),
            None => {
                skip_missing(kind, name);
                None
            }
        })
        .collect()
}

fn insert_all<V: Clone>(dst: &mut BTreeMap<String, V>, src: &BTreeMap<String, V>) {
    dst.extend(src.iter().map(|(name, v)| (name.clone(), v.clone())));
}

fn remove_all<V>(dst: &mut BTreeMap<String, V>, src: &BTreeMap<String, V>) {
    for name in src.keys() {
        dst.remove(name);
    }
}

impl RobotParts {
    /// Insert everything in `to_add`, overwriting entries of the same name
    pub async fn merge_add(&mut self, to_add: &RobotParts) -> Result<PartsMergeResult, RobotError> {
        let replaced_processes =
            axon_process::merge_add(&self.process_manager, &to_add.process_manager).await?;

        insert_all(&mut self.remotes, &to_add.remotes);
        insert_all(&mut self.boards, &to_add.boards);
        insert_all(&mut self.arms, &to_add.arms);
        insert_all(&mut self.bases, &to_add.bases);
        insert_all(&mut self.grippers, &to_add.grippers);
        insert_all(&mut self.cameras, &to_add.cameras);
        insert_all(&mut self.lidars, &to_add.lidars);
        insert_all(&mut self.sensors, &to_add.sensors);
        insert_all(&mut self.providers, &to_add.providers);
        self.functions.extend(to_add.functions.iter().cloned());

        debug!(replaced_processes = replaced_processes.len(), "Merged added parts");
        Ok(PartsMergeResult { replaced_processes })
    }

    /// Resolve every replacement in `to_modify` against this graph without
    /// changing anything.
    ///
    /// Names that are not running are skipped. A sensor whose replacement
    /// offers a different capability fails the whole stage.
    pub(crate) fn stage_modify(&self, to_modify: &RobotParts) -> Result<StagedModify, RobotError> {
        let mut staged = StagedModify::default();

        for (name, remote) in &to_modify.remotes {
            match self.remotes.get(name) {
                Some(live) => staged.remotes.push((live.clone(), remote.clone())),
                None => skip_missing("remote", name),
            }
        }
        for (name, board) in &to_modify.boards {
            match self.boards.get(name) {
                Some(live) => staged.boards.push((name.clone(), live.clone(), board.actual())),
                None => skip_missing("board", name),
            }
        }
        staged.arms = stage_proxies("arm", &self.arms, &to_modify.arms);
        staged.bases = stage_proxies("base", &self.bases, &to_modify.bases);
        staged.grippers = stage_proxies("gripper", &self.grippers, &to_modify.grippers);
        staged.cameras = stage_proxies("camera", &self.cameras, &to_modify.cameras);
        staged.lidars = stage_proxies("lidar", &self.lidars, &to_modify.lidars);
        staged.providers = stage_proxies("provider", &self.providers, &to_modify.providers);
        for (name, sensor) in &to_modify.sensors {
            match self.sensors.get(name) {
                Some(live) => {
                    live.check_replace(name, sensor)?;
                    staged.sensors.push((live.clone(), sensor.clone()));
                }
                None => skip_missing("sensor", name),
            }
        }

        Ok(staged)
    }

    /// Swap the instances of `to_modify` into the proxies of this graph.
    ///
    /// Every replacement is resolved and the processes are merged before
    /// any proxy changes; once swapping starts it runs to completion. The
    /// swapped out instances are closed afterwards and close failures are
    /// only logged.
    pub async fn merge_modify(
        &mut self,
        to_modify: &RobotParts,
        diff: &Diff,
    ) -> Result<PartsMergeResult, RobotError> {
        let staged = self.stage_modify(to_modify)?;
        let replaced_processes =
            axon_process::merge_add(&self.process_manager, &to_modify.process_manager).await?;

        let retired = staged.commit(diff);
        self.functions.extend(to_modify.functions.iter().cloned());

        for close in retired {
            if let Err(e) = close.await {
                warn!(error = %e, "Failed to close replaced resource");
            }
        }
        debug!(replaced_processes = replaced_processes.len(), "Merged modified parts");
        Ok(PartsMergeResult { replaced_processes })
    }

    /// Delete every name in `to_remove` from this graph.
    ///
    /// Nothing is closed here; `to_remove` owns the removed parts.
    pub fn merge_remove(&mut self, to_remove: &RobotParts) {
        remove_all(&mut self.remotes, &to_remove.remotes);
        remove_all(&mut self.boards, &to_remove.boards);
        remove_all(&mut self.arms, &to_remove.arms);
        remove_all(&mut self.bases, &to_remove.bases);
        remove_all(&mut self.grippers, &to_remove.grippers);
        remove_all(&mut self.cameras, &to_remove.cameras);
        remove_all(&mut self.lidars, &to_remove.lidars);
        remove_all(&mut self.sensors, &to_remove.sensors);
        remove_all(&mut self.providers, &to_remove.providers);
        for name in &to_remove.functions {
            self.functions.remove(name);
        }
        let removed = axon_process::merge_remove(&self.process_manager, &to_remove.process_manager);
        debug!(removed_processes = removed.len(), "Removed parts");
    }

    /// A new graph holding the parts of this one that `config` names.
    ///
    /// Resources get fresh proxies around the same instances. Names that
    /// are not running are skipped.
    pub async fn filter_from_config(&self, config: &Config) -> Result<RobotParts, RobotError> {
        let mut filtered = RobotParts::new();

        for process in &config.processes {
            if let Some(p) = self.process_manager.process_by_id(&process.id) {
                filtered.process_manager.add_process(p, false).await?;
            }
        }
        for remote in &config.remotes {
            if let Some(r) = self.remotes.get(&remote.name) {
                filtered.add_remote(r.clone());
            }
        }
        for board in &config.boards {
            if let Some(b) = self.board_by_name(&board.name) {
                filtered.add_board(&board.name, b.actual());
            }
        }
        for component in &config.components {
            let name = component.name.as_str();
            match &component.r#type {
                ComponentType::Arm => {
                    if let Some(h) = self.arm_by_name(name) {
                        filtered.add_arm(name, h.actual());
                    }
                }
                ComponentType::Base => {
                    if let Some(h) = self.base_by_name(name) {
                        filtered.add_base(name, h.actual());
                    }
                }
                ComponentType::Gripper => {
                    if let Some(h) = self.gripper_by_name(name) {
                        filtered.add_gripper(name, h.actual());
                    }
                }
                ComponentType::Camera => {
                    if let Some(h) = self.camera_by_name(name) {
                        filtered.add_camera(name, h.actual());
                    }
                }
                ComponentType::Lidar => {
                    if let Some(h) = self.lidar_by_name(name) {
                        filtered.add_lidar(name, h.actual());
                    }
                }
                ComponentType::Sensor => {
                    if let Some(h) = self.sensor_by_name(name) {
                        filtered.sensors.insert(name.to_string(), h.rewrap());
                    }
                }
                ComponentType::Provider => {
                    if let Some(h) = self.provider_by_name(name) {
                        filtered.add_provider(name, h.actual());
                    }
                }
                ComponentType::Board | ComponentType::Other(_) => {
                    return Err(RobotError::UnknownComponentType {
                        name: name.to_string(),
                        kind: component.r#type.to_string(),
                    });
                }
            }
        }
        for function in &config.functions {
            if self.functions.contains(&function.name) {
                filtered.add_function(&function.name);
            }
        }

        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeArm, FakeBoard, FakeCamera, FakeCompass, FakeSensor};
    use crate::proxy::SensorKind;
    use async_trait::async_trait;
    use axon_core::{
        AnalogConfig, BoardConfig, BoardConfigDiff, Component, FunctionConfig, ModifiedConfigDiff,
    };

    struct TestProcess {
        id: String,
    }

    fn process(id: &str) -> Arc<dyn ManagedProcess> {
        Arc::new(TestProcess { id: id.to_string() })
    }

    #[async_trait]
    impl ManagedProcess for TestProcess {
        fn id(&self) -> &str {
            &self.id
        }

        async fn start(&self) -> Result<(), ProcessError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    fn analog(name: &str) -> AnalogConfig {
        AnalogConfig {
            name: name.to_string(),
            pin: "0".to_string(),
            average_over_ms: 0,
        }
    }

    fn all_names(parts: &RobotParts) -> Vec<Vec<String>> {
        vec![
            parts.remote_names(),
            parts.board_names(),
            parts.arm_names(),
            parts.base_names(),
            parts.gripper_names(),
            parts.camera_names(),
            parts.lidar_names(),
            parts.sensor_names(),
            parts.provider_names(),
            parts.function_names(),
            parts.process_manager().process_ids(),
        ]
    }

    #[tokio::test]
    async fn test_merge_add_then_remove_restores_names() {
        let mut live = RobotParts::new();
        live.add_arm("arm1", FakeArm::new("arm1"));
        live.add_function("func1");
        let before = all_names(&live);

        let mut to_add = RobotParts::new();
        to_add.add_arm("arm2", FakeArm::new("arm2"));
        to_add.add_camera("cam1", FakeCamera::new("cam1"));
        to_add.add_sensor("s1", FakeSensor::new("s1"));
        to_add.add_function("func2");
        to_add.process_manager().add_process(process("p1"), false).await.unwrap();

        let result = live.merge_add(&to_add).await.unwrap();
        assert!(result.replaced_processes().is_empty());
        assert_eq!(live.arm_names(), vec!["arm1", "arm2"]);
        assert_eq!(live.camera_names(), vec!["cam1"]);
        assert_eq!(live.function_names(), vec!["func1", "func2"]);
        assert_eq!(live.process_manager().process_ids(), vec!["p1"]);

        live.merge_remove(&to_add);
        assert_eq!(all_names(&live), before);
    }

    #[tokio::test]
    async fn test_merge_add_reports_replaced_processes() {
        let mut live = RobotParts::new();
        let old = process("p1");
        live.process_manager().add_process(old.clone(), false).await.unwrap();

        let to_add = RobotParts::new();
        to_add.process_manager().add_process(process("p1"), false).await.unwrap();

        let result = live.merge_add(&to_add).await.unwrap();
        assert_eq!(result.replaced_processes().len(), 1);
        assert!(Arc::ptr_eq(&result.replaced_processes()[0], &old));

        let to_remove = RobotParts::new();
        result.process(&to_remove).await.unwrap();
        assert_eq!(to_remove.process_manager().process_ids(), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_merge_result_rejects_existing_process() {
        let result = PartsMergeResult {
            replaced_processes: vec![process("p1")],
        };
        let target = RobotParts::new();
        target.process_manager().add_process(process("p1"), false).await.unwrap();
        let err = result.process(&target).await.unwrap_err();
        assert!(matches!(err, RobotError::UnexpectedProcessReplacement(id) if id == "p1"));
    }

    #[tokio::test]
    async fn test_merge_modify_swaps_behind_held_handles() {
        let mut live = RobotParts::new();
        let old = FakeArm::new("arm1");
        live.add_arm("arm1", old.clone());
        let held = live.arm_by_name("arm1").unwrap();

        let mut to_modify = RobotParts::new();
        let next = FakeArm::new("arm1");
        to_modify.add_arm("arm1", next.clone());

        live.merge_modify(&to_modify, &Diff::default()).await.unwrap();

        let next_dyn: Arc<dyn Arm> = next;
        assert!(Arc::ptr_eq(&held.actual(), &next_dyn));
        assert!(Arc::ptr_eq(&held, &live.arm_by_name("arm1").unwrap()));
        assert!(old.is_closed());
    }

    #[tokio::test]
    async fn test_merge_modify_skips_missing_targets() {
        let mut live = RobotParts::new();
        live.add_arm("arm1", FakeArm::new("arm1"));

        let mut to_modify = RobotParts::new();
        to_modify.add_arm("ghost", FakeArm::new("ghost"));

        live.merge_modify(&to_modify, &Diff::default()).await.unwrap();
        assert_eq!(live.arm_names(), vec!["arm1"]);
    }

    #[tokio::test]
    async fn test_merge_modify_sensor_mismatch_changes_nothing() {
        let mut live = RobotParts::new();
        let old_arm = FakeArm::new("arm1");
        live.add_arm("arm1", old_arm.clone());
        live.add_sensor("heading", FakeCompass::new("heading"));

        let mut to_modify = RobotParts::new();
        to_modify.add_arm("arm1", FakeArm::new("arm1"));
        to_modify.add_sensor("heading", FakeSensor::new("heading"));

        let err = live.merge_modify(&to_modify, &Diff::default()).await.unwrap_err();
        assert!(matches!(err, RobotError::SensorKindMismatch { ref name, .. } if name == "heading"));

        let old_dyn: Arc<dyn Arm> = old_arm.clone();
        assert!(Arc::ptr_eq(&live.arm_by_name("arm1").unwrap().actual(), &old_dyn));
        assert!(!old_arm.is_closed());
        assert_eq!(live.sensor_by_name("heading").unwrap().kind(), SensorKind::Compass);
    }

    #[tokio::test]
    async fn test_merge_modify_board_applies_diff() {
        let mut left = BoardConfig::new("board1");
        left.analogs = vec![analog("a1"), analog("a2")];
        let mut live = RobotParts::new();
        live.add_board("board1", FakeBoard::new(&left));

        let mut removed = BoardConfig::new("board1");
        removed.analogs = vec![analog("a2")];
        let mut added = BoardConfig::new("board1");
        added.analogs = vec![analog("a3")];
        let board_diff = BoardConfigDiff {
            left,
            added,
            removed,
            modified: BoardConfig::new("board1"),
        };

        let mut to_modify = RobotParts::new();
        to_modify.add_board("board1", FakeBoard::new(&board_diff.to_config().unwrap()));

        let diff = Diff {
            modified: ModifiedConfigDiff {
                boards: [("board1".to_string(), board_diff)].into_iter().collect(),
                ..Default::default()
            },
            ..Default::default()
        };
        live.merge_modify(&to_modify, &diff).await.unwrap();

        let board = live.board_by_name("board1").unwrap();
        assert_eq!(board.analog_reader_names(), vec!["a1", "a3"]);
    }

    #[tokio::test]
    async fn test_filter_from_config_selects_subset() {
        let mut live = RobotParts::new();
        live.add_arm("arm1", FakeArm::new("arm1"));
        live.add_arm("arm2", FakeArm::new("arm2"));
        live.add_sensor("heading", FakeCompass::new("heading"));
        live.add_function("func1");

        let config = Config {
            components: vec![
                Component::new("arm1", ComponentType::Arm),
                Component::new("arm9", ComponentType::Arm),
                Component::new("heading", ComponentType::Sensor).with_sub_type("compass"),
            ],
            functions: vec![
                FunctionConfig {
                    name: "func1".to_string(),
                    ..Default::default()
                },
                FunctionConfig {
                    name: "func9".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let filtered = live.filter_from_config(&config).await.unwrap();
        assert_eq!(filtered.arm_names(), vec!["arm1"]);
        assert_eq!(filtered.sensor_names(), vec!["heading"]);
        assert_eq!(filtered.function_names(), vec!["func1"]);

        let live_arm = live.arm_by_name("arm1").unwrap();
        let filtered_arm = filtered.arm_by_name("arm1").unwrap();
        assert!(!Arc::ptr_eq(&live_arm, &filtered_arm));
        assert!(Arc::ptr_eq(&live_arm.actual(), &filtered_arm.actual()));

        let sensor = filtered.sensor_by_name("heading").unwrap();
        assert_eq!(sensor.kind(), SensorKind::Compass);
        assert!(!sensor.same_proxy(&live.sensor_by_name("heading").unwrap()));
    }

    #[tokio::test]
    async fn test_filter_rejects_board_typed_component() {
        let live = RobotParts::new();
        let config = Config {
            components: vec![Component::new("board1", ComponentType::Board)],
            ..Default::default()
        };
        let err = live.filter_from_config(&config).await.unwrap_err();
        assert!(matches!(err, RobotError::UnknownComponentType { .. }));
    }
}
