//! Construction of driver instances from config

use async_trait::async_trait;
use axon_core::{BoardConfig, Component, ComponentType};
use std::sync::Arc;
use tracing::debug;

use crate::error::RobotError;
use crate::resource::{Arm, Base, Board, Camera, Gripper, Lidar, Provider, Sensor};

/// Builds concrete driver instances
///
/// The robot never constructs drivers itself; it asks a factory and wraps
/// whatever comes back.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    async fn new_board(&self, config: &BoardConfig) -> anyhow::Result<Arc<dyn Board>>;
    async fn new_arm(&self, config: &Component) -> anyhow::Result<Arc<dyn Arm>>;
    async fn new_base(&self, config: &Component) -> anyhow::Result<Arc<dyn Base>>;
    async fn new_gripper(&self, config: &Component) -> anyhow::Result<Arc<dyn Gripper>>;
    async fn new_camera(&self, config: &Component) -> anyhow::Result<Arc<dyn Camera>>;
    async fn new_lidar(&self, config: &Component) -> anyhow::Result<Arc<dyn Lidar>>;
    async fn new_sensor(&self, config: &Component, sub_type: &str)
        -> anyhow::Result<Arc<dyn Sensor>>;
    async fn new_provider(&self, config: &Component) -> anyhow::Result<Arc<dyn Provider>>;
}

/// A freshly constructed component, not yet wrapped in a proxy
pub enum Part {
    Arm(Arc<dyn Arm>),
    Base(Arc<dyn Base>),
    Gripper(Arc<dyn Gripper>),
    Camera(Arc<dyn Camera>),
    Lidar(Arc<dyn Lidar>),
    Sensor(Arc<dyn Sensor>),
    Provider(Arc<dyn Provider>),
}

impl Part {
    /// Construct the component through `factory`, dispatching on its type
    pub async fn construct(
        factory: &dyn ResourceFactory,
        component: &Component,
    ) -> Result<Part, RobotError> {
        debug!(component = %component.name, kind = %component.r#type, "Constructing component");
        let built = match &component.r#type {
            ComponentType::Arm => factory.new_arm(component).await.map(Part::Arm),
            ComponentType::Base => factory.new_base(component).await.map(Part::Base),
            ComponentType::Gripper => factory.new_gripper(component).await.map(Part::Gripper),
            ComponentType::Camera => factory.new_camera(component).await.map(Part::Camera),
            ComponentType::Lidar => factory.new_lidar(component).await.map(Part::Lidar),
            ComponentType::Provider => factory.new_provider(component).await.map(Part::Provider),
            ComponentType::Sensor => {
                if component.sub_type.is_empty() {
                    return Err(RobotError::MissingSubtype(component.name.clone()));
                }
                factory
                    .new_sensor(component, &component.sub_type)
                    .await
                    .map(Part::Sensor)
            }
            ComponentType::Board | ComponentType::Other(_) => {
                return Err(RobotError::UnknownComponentType {
                    name: component.name.clone(),
                    kind: component.r#type.to_string(),
                });
            }
        };
        built.map_err(|source| RobotError::Construct {
            kind: component.r#type.to_string(),
            name: component.name.clone(),
            source,
        })
    }
}
