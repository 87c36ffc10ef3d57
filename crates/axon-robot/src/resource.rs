//! Capability traits implemented by drivers
//!
//! Every capability kind is an object-safe async trait. Drivers hand the
//! robot `Arc<dyn Kind>` instances; the robot wraps each one in a proxy.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Behavior shared by every resource
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Release whatever the resource holds. Most resources hold nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Position and orientation in millimeters and degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

#[async_trait]
pub trait Arm: Resource {
    async fn current_position(&self) -> Result<Pose>;

    async fn move_to_position(&self, pose: Pose) -> Result<()>;

    async fn joint_positions(&self) -> Result<Vec<f64>>;

    async fn move_to_joint_positions(&self, degrees: &[f64]) -> Result<()>;
}

#[async_trait]
pub trait Base: Resource {
    /// Drive straight, returning the distance actually covered
    async fn move_straight(&self, distance_mm: i64, mm_per_sec: f64) -> Result<i64>;

    /// Spin in place, returning the angle actually turned
    async fn spin(&self, angle_deg: f64, deg_per_sec: f64) -> Result<f64>;

    async fn stop(&self) -> Result<()>;

    fn width_mm(&self) -> i64;
}

#[async_trait]
pub trait Gripper: Resource {
    async fn open(&self) -> Result<()>;

    /// Close the gripper, returning whether something was grabbed
    async fn grab(&self) -> Result<bool>;
}

/// A single image produced by a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Camera: Resource {
    /// Produce the next frame of the camera's stream
    async fn next(&self) -> Result<Frame>;
}

/// One lidar return
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidarMeasurement {
    pub angle_deg: f64,
    pub distance_m: f64,
}

#[async_trait]
pub trait Lidar: Resource {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn scan(&self) -> Result<Vec<LidarMeasurement>>;
}

#[async_trait]
pub trait AnalogReader: Send + Sync + 'static {
    async fn read(&self) -> Result<i32>;
}

#[async_trait]
pub trait DigitalInterrupt: Send + Sync + 'static {
    /// Current counter value
    async fn value(&self) -> Result<i64>;

    async fn tick(&self, high: bool, nanos: u64) -> Result<()>;
}

/// A board and the sub-resources wired to its pins
#[async_trait]
pub trait Board: Resource {
    fn analog_reader_names(&self) -> Vec<String>;

    fn analog_reader_by_name(&self, name: &str) -> Option<Arc<dyn AnalogReader>>;

    fn digital_interrupt_names(&self) -> Vec<String>;

    fn digital_interrupt_by_name(&self, name: &str) -> Option<Arc<dyn DigitalInterrupt>>;

    async fn gpio_set(&self, pin: &str, high: bool) -> Result<()>;

    async fn gpio_get(&self, pin: &str) -> Result<bool>;
}

/// A generic sensor
///
/// Sensors that are also compasses advertise it through the `as_*` probes,
/// which the robot consults once when the sensor is registered.
#[async_trait]
pub trait Sensor: Resource {
    async fn readings(&self) -> Result<Vec<f64>>;

    fn as_compass(self: Arc<Self>) -> Option<Arc<dyn Compass>> {
        None
    }

    fn as_relative_compass(self: Arc<Self>) -> Option<Arc<dyn RelativeCompass>> {
        None
    }
}

#[async_trait]
pub trait Compass: Sensor {
    /// Heading in degrees
    async fn heading(&self) -> Result<f64>;

    async fn start_calibration(&self) -> Result<()>;

    async fn stop_calibration(&self) -> Result<()>;
}

/// A compass whose heading is relative to a marked reference
#[async_trait]
pub trait RelativeCompass: Compass {
    /// Make the current heading the new zero
    async fn mark(&self) -> Result<()>;
}

/// A component other components implicitly depend on
#[async_trait]
pub trait Provider: Resource {
    async fn ready(&self) -> Result<()>;
}
