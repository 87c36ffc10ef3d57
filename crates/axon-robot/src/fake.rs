//! In-memory drivers for every capability kind
//!
//! [`FakeFactory`] builds these for components whose model is empty or
//! `"fake"`, which lets a robot run without hardware. Setting the attribute
//! `fail_close = true` on a component makes its `close` report an error.

use anyhow::{bail, Result};
use async_trait::async_trait;
use axon_core::{BoardConfig, Component};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::factory::ResourceFactory;
use crate::remote::{RemoteConnector, Robot};
use crate::resource::{
    AnalogReader, Arm, Base, Board, Camera, Compass, DigitalInterrupt, Frame, Gripper, Lidar,
    LidarMeasurement, Pose, Provider, RelativeCompass, Resource, Sensor,
};

pub const FAKE_MODEL: &str = "fake";

#[derive(Debug, Default)]
struct Lifecycle {
    closed: AtomicBool,
    fail_close: AtomicBool,
}

impl Lifecycle {
    fn from_attributes(attributes: &HashMap<String, serde_json::Value>) -> Self {
        let fail_close = attributes
            .get("fail_close")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Self {
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(fail_close),
        }
    }

    fn close(&self, name: &str) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            bail!("fake \"{}\" failed to close", name);
        }
        Ok(())
    }
}

macro_rules! fake_resource {
    ($fake:ident) => {
        impl $fake {
            pub fn is_closed(&self) -> bool {
                self.lifecycle.closed.load(Ordering::SeqCst)
            }

            /// Make `close` fail after marking the resource closed
            pub fn failing_close(self: Arc<Self>) -> Arc<Self> {
                self.lifecycle.fail_close.store(true, Ordering::SeqCst);
                self
            }
        }

        #[async_trait]
        impl Resource for $fake {
            async fn close(&self) -> Result<()> {
                self.lifecycle.close(&self.name)
            }
        }
    };
}

pub struct FakeArm {
    name: String,
    lifecycle: Lifecycle,
    position: Mutex<Pose>,
    joints: Mutex<Vec<f64>>,
}

impl FakeArm {
    pub fn new(name: &str) -> Arc<Self> {
        Self::from_component(&Component::new(name, axon_core::ComponentType::Arm))
    }

    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            position: Mutex::new(Pose::default()),
            joints: Mutex::new(vec![0.0; 6]),
        })
    }
}

fake_resource!(FakeArm);

#[async_trait]
impl Arm for FakeArm {
    async fn current_position(&self) -> Result<Pose> {
        Ok(*self.position.lock())
    }

    async fn move_to_position(&self, pose: Pose) -> Result<()> {
        *self.position.lock() = pose;
        Ok(())
    }

    async fn joint_positions(&self) -> Result<Vec<f64>> {
        Ok(self.joints.lock().clone())
    }

    async fn move_to_joint_positions(&self, degrees: &[f64]) -> Result<()> {
        let mut joints = self.joints.lock();
        if degrees.len() != joints.len() {
            bail!("expected {} joint positions, got {}", joints.len(), degrees.len());
        }
        joints.copy_from_slice(degrees);
        Ok(())
    }
}

pub struct FakeBase {
    name: String,
    lifecycle: Lifecycle,
    width_mm: i64,
    travelled_mm: AtomicI64,
}

impl FakeBase {
    fn from_component(config: &Component) -> Arc<Self> {
        let width_mm = config
            .attributes
            .get("width_mm")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(600);
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            width_mm,
            travelled_mm: AtomicI64::new(0),
        })
    }

    pub fn travelled_mm(&self) -> i64 {
        self.travelled_mm.load(Ordering::SeqCst)
    }
}

fake_resource!(FakeBase);

#[async_trait]
impl Base for FakeBase {
    async fn move_straight(&self, distance_mm: i64, _mm_per_sec: f64) -> Result<i64> {
        self.travelled_mm.fetch_add(distance_mm.abs(), Ordering::SeqCst);
        Ok(distance_mm)
    }

    async fn spin(&self, angle_deg: f64, _deg_per_sec: f64) -> Result<f64> {
        Ok(angle_deg)
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn width_mm(&self) -> i64 {
        self.width_mm
    }
}

pub struct FakeGripper {
    name: String,
    lifecycle: Lifecycle,
    open: AtomicBool,
}

impl FakeGripper {
    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            open: AtomicBool::new(true),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

fake_resource!(FakeGripper);

#[async_trait]
impl Gripper for FakeGripper {
    async fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn grab(&self) -> Result<bool> {
        self.open.store(false, Ordering::SeqCst);
        Ok(false)
    }
}

pub struct FakeCamera {
    name: String,
    lifecycle: Lifecycle,
    width: u32,
    height: u32,
    frames: AtomicU64,
}

impl FakeCamera {
    pub fn new(name: &str) -> Arc<Self> {
        Self::from_component(&Component::new(name, axon_core::ComponentType::Camera))
    }

    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            width: 4,
            height: 3,
            frames: AtomicU64::new(0),
        })
    }
}

fake_resource!(FakeCamera);

#[async_trait]
impl Camera for FakeCamera {
    async fn next(&self) -> Result<Frame> {
        let frame = self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(Frame {
            width: self.width,
            height: self.height,
            mime_type: "image/x-raw-gray".to_string(),
            data: vec![(frame % 256) as u8; (self.width * self.height) as usize],
        })
    }
}

pub struct FakeLidar {
    name: String,
    lifecycle: Lifecycle,
    running: AtomicBool,
}

impl FakeLidar {
    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            running: AtomicBool::new(false),
        })
    }
}

fake_resource!(FakeLidar);

#[async_trait]
impl Lidar for FakeLidar {
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<LidarMeasurement>> {
        if !self.running.load(Ordering::SeqCst) {
            bail!("lidar \"{}\" is not started", self.name);
        }
        Ok((0..8)
            .map(|i| LidarMeasurement {
                angle_deg: f64::from(i) * 45.0,
                distance_m: 1.0,
            })
            .collect())
    }
}

#[derive(Debug)]
pub struct FakeAnalogReader {
    value: AtomicI32,
}

impl FakeAnalogReader {
    pub fn set(&self, value: i32) {
        self.value.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalogReader for FakeAnalogReader {
    async fn read(&self) -> Result<i32> {
        Ok(self.value.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Default)]
pub struct FakeDigitalInterrupt {
    count: AtomicI64,
}

#[async_trait]
impl DigitalInterrupt for FakeDigitalInterrupt {
    async fn value(&self) -> Result<i64> {
        Ok(self.count.load(Ordering::SeqCst))
    }

    async fn tick(&self, high: bool, _nanos: u64) -> Result<()> {
        if high {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct FakeBoard {
    name: String,
    lifecycle: Lifecycle,
    analogs: BTreeMap<String, Arc<FakeAnalogReader>>,
    digital_interrupts: BTreeMap<String, Arc<FakeDigitalInterrupt>>,
    gpio: Mutex<HashMap<String, bool>>,
}

impl FakeBoard {
    pub fn new(config: &BoardConfig) -> Arc<Self> {
        let analogs = config
            .analogs
            .iter()
            .map(|a| {
                let reader = FakeAnalogReader {
                    value: AtomicI32::new(0),
                };
                (a.name.clone(), Arc::new(reader))
            })
            .collect();
        let digital_interrupts = config
            .digital_interrupts
            .iter()
            .map(|d| (d.name.clone(), Arc::new(FakeDigitalInterrupt::default())))
            .collect();

        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            analogs,
            digital_interrupts,
            gpio: Mutex::new(HashMap::new()),
        })
    }

    pub fn analog(&self, name: &str) -> Option<Arc<FakeAnalogReader>> {
        self.analogs.get(name).cloned()
    }
}

fake_resource!(FakeBoard);

#[async_trait]
impl Board for FakeBoard {
    fn analog_reader_names(&self) -> Vec<String> {
        self.analogs.keys().cloned().collect()
    }

    fn analog_reader_by_name(&self, name: &str) -> Option<Arc<dyn AnalogReader>> {
        let reader = self.analogs.get(name)?.clone();
        Some(reader)
    }

    fn digital_interrupt_names(&self) -> Vec<String> {
        self.digital_interrupts.keys().cloned().collect()
    }

    fn digital_interrupt_by_name(&self, name: &str) -> Option<Arc<dyn DigitalInterrupt>> {
        let interrupt = self.digital_interrupts.get(name)?.clone();
        Some(interrupt)
    }

    async fn gpio_set(&self, pin: &str, high: bool) -> Result<()> {
        self.gpio.lock().insert(pin.to_string(), high);
        Ok(())
    }

    async fn gpio_get(&self, pin: &str) -> Result<bool> {
        Ok(self.gpio.lock().get(pin).copied().unwrap_or(false))
    }
}

pub struct FakeSensor {
    name: String,
    lifecycle: Lifecycle,
}

impl FakeSensor {
    pub fn new(name: &str) -> Arc<Self> {
        Self::from_component(&Component::new(name, axon_core::ComponentType::Sensor))
    }

    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
        })
    }
}

fake_resource!(FakeSensor);

#[async_trait]
impl Sensor for FakeSensor {
    async fn readings(&self) -> Result<Vec<f64>> {
        Ok(vec![1.0, 2.0, 3.0])
    }
}

pub struct FakeCompass {
    name: String,
    lifecycle: Lifecycle,
    heading: Mutex<f64>,
    calibrating: AtomicBool,
}

impl FakeCompass {
    pub fn new(name: &str) -> Arc<Self> {
        Self::from_component(&Component::new(name, axon_core::ComponentType::Sensor))
    }

    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            heading: Mutex::new(0.0),
            calibrating: AtomicBool::new(false),
        })
    }

    pub fn set_heading(&self, degrees: f64) {
        *self.heading.lock() = degrees;
    }
}

fake_resource!(FakeCompass);

#[async_trait]
impl Sensor for FakeCompass {
    async fn readings(&self) -> Result<Vec<f64>> {
        Ok(vec![*self.heading.lock()])
    }

    fn as_compass(self: Arc<Self>) -> Option<Arc<dyn Compass>> {
        Some(self)
    }
}

#[async_trait]
impl Compass for FakeCompass {
    async fn heading(&self) -> Result<f64> {
        if self.calibrating.load(Ordering::SeqCst) {
            bail!("compass \"{}\" is calibrating", self.name);
        }
        Ok(*self.heading.lock())
    }

    async fn start_calibration(&self) -> Result<()> {
        self.calibrating.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_calibration(&self) -> Result<()> {
        self.calibrating.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeRelativeCompass {
    name: String,
    lifecycle: Lifecycle,
    heading: Mutex<f64>,
    reference: Mutex<f64>,
}

impl FakeRelativeCompass {
    pub fn new(name: &str) -> Arc<Self> {
        Self::from_component(&Component::new(name, axon_core::ComponentType::Sensor))
    }

    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
            heading: Mutex::new(0.0),
            reference: Mutex::new(0.0),
        })
    }

    pub fn set_heading(&self, degrees: f64) {
        *self.heading.lock() = degrees;
    }
}

fake_resource!(FakeRelativeCompass);

#[async_trait]
impl Sensor for FakeRelativeCompass {
    async fn readings(&self) -> Result<Vec<f64>> {
        Ok(vec![self.heading().await?])
    }

    fn as_compass(self: Arc<Self>) -> Option<Arc<dyn Compass>> {
        Some(self)
    }

    fn as_relative_compass(self: Arc<Self>) -> Option<Arc<dyn RelativeCompass>> {
        Some(self)
    }
}

#[async_trait]
impl Compass for FakeRelativeCompass {
    async fn heading(&self) -> Result<f64> {
        let heading = *self.heading.lock() - *self.reference.lock();
        Ok(heading.rem_euclid(360.0))
    }

    async fn start_calibration(&self) -> Result<()> {
        Ok(())
    }

    async fn stop_calibration(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl RelativeCompass for FakeRelativeCompass {
    async fn mark(&self) -> Result<()> {
        *self.reference.lock() = *self.heading.lock();
        Ok(())
    }
}

pub struct FakeProvider {
    name: String,
    lifecycle: Lifecycle,
}

impl FakeProvider {
    fn from_component(config: &Component) -> Arc<Self> {
        Arc::new(Self {
            name: config.name.clone(),
            lifecycle: Lifecycle::from_attributes(&config.attributes),
        })
    }
}

fake_resource!(FakeProvider);

#[async_trait]
impl Provider for FakeProvider {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds fake drivers for components with an empty or `"fake"` model
#[derive(Debug, Clone, Default)]
pub struct FakeFactory;

impl FakeFactory {
    pub fn new() -> Self {
        Self
    }
}

fn check_model(kind: &str, name: &str, model: &str) -> Result<()> {
    if !model.is_empty() && model != FAKE_MODEL {
        bail!("unknown {} model \"{}\" for \"{}\"", kind, model, name);
    }
    Ok(())
}

#[async_trait]
impl ResourceFactory for FakeFactory {
    async fn new_board(&self, config: &BoardConfig) -> Result<Arc<dyn Board>> {
        check_model("board", &config.name, &config.model)?;
        Ok(FakeBoard::new(config))
    }

    async fn new_arm(&self, config: &Component) -> Result<Arc<dyn Arm>> {
        check_model("arm", &config.name, &config.model)?;
        Ok(FakeArm::from_component(config))
    }

    async fn new_base(&self, config: &Component) -> Result<Arc<dyn Base>> {
        check_model("base", &config.name, &config.model)?;
        Ok(FakeBase::from_component(config))
    }

    async fn new_gripper(&self, config: &Component) -> Result<Arc<dyn Gripper>> {
        check_model("gripper", &config.name, &config.model)?;
        Ok(FakeGripper::from_component(config))
    }

    async fn new_camera(&self, config: &Component) -> Result<Arc<dyn Camera>> {
        check_model("camera", &config.name, &config.model)?;
        Ok(FakeCamera::from_component(config))
    }

    async fn new_lidar(&self, config: &Component) -> Result<Arc<dyn Lidar>> {
        check_model("lidar", &config.name, &config.model)?;
        Ok(FakeLidar::from_component(config))
    }

    async fn new_sensor(&self, config: &Component, sub_type: &str) -> Result<Arc<dyn Sensor>> {
        check_model("sensor", &config.name, &config.model)?;
        let sensor: Arc<dyn Sensor> = match sub_type {
            "compass" => FakeCompass::from_component(config),
            "relative_compass" => FakeRelativeCompass::from_component(config),
            _ => FakeSensor::from_component(config),
        };
        Ok(sensor)
    }

    async fn new_provider(&self, config: &Component) -> Result<Arc<dyn Provider>> {
        check_model("provider", &config.name, &config.model)?;
        Ok(FakeProvider::from_component(config))
    }
}

/// Connects to robots registered ahead of time by address
#[derive(Default)]
pub struct FakeConnector {
    robots: HashMap<String, Arc<dyn Robot>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_robot(mut self, address: &str, robot: Arc<dyn Robot>) -> Self {
        self.robots.insert(address.to_string(), robot);
        self
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Robot>> {
        match self.robots.get(address) {
            Some(robot) => Ok(robot.clone()),
            None => bail!("no robot reachable at {}", address),
        }
    }
}
