//! Axon Robot - Resource graph and hot reconfiguration
//!
//! This crate provides the running side of an Axon robot:
//! - Capability traits drivers implement (arms, bases, boards, sensors, ...)
//! - Swappable proxies that keep handles stable across reconfiguration
//! - [`RobotParts`], the graph of proxies, remotes, functions and processes
//! - Merging of staged graphs into a live one
//! - [`LocalRobot`], which reconfigures itself from a config diff
//! - Fake drivers for running without hardware

pub mod error;
pub mod factory;
pub mod fake;
pub mod merge;
pub mod parts;
pub mod proxy;
pub mod remote;
pub mod resource;
pub mod robot;

pub use error::{CloseErrors, CloseFailure, RobotError};
pub use factory::{Part, ResourceFactory};
pub use fake::{FakeConnector, FakeFactory};
pub use merge::PartsMergeResult;
pub use parts::RobotParts;
pub use proxy::{
    AnalogReaderHandle, ArmHandle, BaseHandle, BoardHandle, BoardProxy, CameraHandle,
    DigitalInterruptHandle, GripperHandle, LidarHandle, ProviderHandle, ResourceProxy,
    SensorHandle, SensorKind,
};
pub use remote::{RemoteConnector, RemoteRobot, Robot};
pub use robot::LocalRobot;
