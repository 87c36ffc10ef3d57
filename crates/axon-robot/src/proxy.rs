//! Stable handles whose underlying resource can be swapped in place
//!
//! Consumers hold an `Arc` to a proxy and call through a snapshot of the
//! current instance: `handle.actual().move_straight(..)`. A reconfiguration
//! replaces the instance behind the proxy, so every existing handle observes
//! the new resource on its next call while a call already in progress
//! finishes against the instance it started on.
//!
//! Proxies do not implement the capability traits. Only concrete driver
//! instances can be wrapped, so a proxy never wraps another proxy.

use axon_core::BoardConfigDiff;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

use crate::error::RobotError;
use crate::resource::{
    AnalogReader, Arm, Base, Board, Camera, Compass, DigitalInterrupt, Gripper, Lidar, Provider,
    RelativeCompass, Resource, Sensor,
};

/// Deferred close of an instance that was swapped out of a proxy
pub(crate) type CloseFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub struct ResourceProxy<T: ?Sized> {
    actual: RwLock<Arc<T>>,
}

pub type ArmHandle = Arc<ResourceProxy<dyn Arm>>;
pub type BaseHandle = Arc<ResourceProxy<dyn Base>>;
pub type GripperHandle = Arc<ResourceProxy<dyn Gripper>>;
pub type CameraHandle = Arc<ResourceProxy<dyn Camera>>;
pub type LidarHandle = Arc<ResourceProxy<dyn Lidar>>;
pub type ProviderHandle = Arc<ResourceProxy<dyn Provider>>;
pub type AnalogReaderHandle = Arc<ResourceProxy<dyn AnalogReader>>;
pub type DigitalInterruptHandle = Arc<ResourceProxy<dyn DigitalInterrupt>>;
pub type BoardHandle = Arc<BoardProxy>;

impl<T: ?Sized> ResourceProxy<T> {
    pub fn new(actual: Arc<T>) -> Arc<Self> {
        Arc::new(Self {
            actual: RwLock::new(actual),
        })
    }

    /// Snapshot of the instance currently behind the proxy
    pub fn actual(&self) -> Arc<T> {
        self.actual.read().clone()
    }

    /// Swap in a new instance, returning the previous one
    pub fn replace(&self, actual: Arc<T>) -> Arc<T> {
        std::mem::replace(&mut *self.actual.write(), actual)
    }
}

impl<T: ?Sized + Resource> ResourceProxy<T> {
    pub async fn close(&self) -> anyhow::Result<()> {
        self.actual().close().await
    }

    /// Replace the instance and hand back the close of the old one
    pub(crate) fn swap(&self, actual: Arc<T>) -> Option<CloseFuture> {
        let old = self.replace(actual.clone());
        retire(old, &actual)
    }
}

impl<T: ?Sized> std::fmt::Debug for ResourceProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceProxy").finish_non_exhaustive()
    }
}

fn retire<T: ?Sized + Resource>(old: Arc<T>, new: &Arc<T>) -> Option<CloseFuture> {
    if Arc::ptr_eq(&old, new) {
        return None;
    }
    let close: CloseFuture = Box::pin(async move { old.close().await });
    Some(close)
}

/// Proxy for a board and the analog readers and digital interrupts on it
///
/// Sub-resources get proxies of their own so that a handle to a single
/// analog reader survives the board being reconfigured.
pub struct BoardProxy {
    actual: RwLock<Arc<dyn Board>>,
    analogs: RwLock<BTreeMap<String, AnalogReaderHandle>>,
    digital_interrupts: RwLock<BTreeMap<String, DigitalInterruptHandle>>,
}

impl BoardProxy {
    pub fn new(actual: Arc<dyn Board>) -> Arc<Self> {
        let analogs = actual
            .analog_reader_names()
            .into_iter()
            .filter_map(|name| {
                let reader = actual.analog_reader_by_name(&name)?;
                Some((name, ResourceProxy::new(reader)))
            })
            .collect();
        let digital_interrupts = actual
            .digital_interrupt_names()
            .into_iter()
            .filter_map(|name| {
                let interrupt = actual.digital_interrupt_by_name(&name)?;
                Some((name, ResourceProxy::new(interrupt)))
            })
            .collect();

        Arc::new(Self {
            actual: RwLock::new(actual),
            analogs: RwLock::new(analogs),
            digital_interrupts: RwLock::new(digital_interrupts),
        })
    }

    pub fn actual(&self) -> Arc<dyn Board> {
        self.actual.read().clone()
    }

    pub fn analog_reader_names(&self) -> Vec<String> {
        let _board = self.actual.read();
        self.analogs.read().keys().cloned().collect()
    }

    pub fn analog_reader_by_name(&self, name: &str) -> Option<AnalogReaderHandle> {
        let _board = self.actual.read();
        self.analogs.read().get(name).cloned()
    }

    pub fn digital_interrupt_names(&self) -> Vec<String> {
        let _board = self.actual.read();
        self.digital_interrupts.read().keys().cloned().collect()
    }

    pub fn digital_interrupt_by_name(&self, name: &str) -> Option<DigitalInterruptHandle> {
        let _board = self.actual.read();
        self.digital_interrupts.read().get(name).cloned()
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.actual().close().await
    }

    /// Replace the board wholesale, reconciling sub-proxies by name
    ///
    /// The board lock is held until the sub-proxies point at the new board.
    /// Sub-proxy maps are always locked after the board lock.
    pub(crate) fn replace(&self, actual: Arc<dyn Board>) -> Option<CloseFuture> {
        let mut current = self.actual.write();
        let old = std::mem::replace(&mut *current, actual.clone());

        let analogs = actual.analog_reader_names();
        let stale = stale_names(&self.analogs, &analogs);
        sync_sub_proxies(&self.analogs, &stale, &analogs, |name| {
            actual.analog_reader_by_name(name)
        });

        let interrupts = actual.digital_interrupt_names();
        let stale = stale_names(&self.digital_interrupts, &interrupts);
        sync_sub_proxies(&self.digital_interrupts, &stale, &interrupts, |name| {
            actual.digital_interrupt_by_name(name)
        });
        drop(current);

        retire(old, &actual)
    }

    /// Replace the board, applying a sub-resource diff to the sub-proxies
    ///
    /// Removed names are dropped, added names get new proxies and every
    /// remaining proxy is rebound to the new board's instance.
    pub(crate) fn merge(
        &self,
        actual: Arc<dyn Board>,
        diff: &BoardConfigDiff,
    ) -> Option<CloseFuture> {
        let mut current = self.actual.write();
        let old = std::mem::replace(&mut *current, actual.clone());

        let changes = diff.analog_changes();
        let updated = updated_names(&self.analogs, &changes.removed, &changes.added);
        sync_sub_proxies(&self.analogs, &changes.removed, &updated, |name| {
            actual.analog_reader_by_name(name)
        });

        let changes = diff.digital_interrupt_changes();
        let updated = updated_names(&self.digital_interrupts, &changes.removed, &changes.added);
        sync_sub_proxies(&self.digital_interrupts, &changes.removed, &updated, |name| {
            actual.digital_interrupt_by_name(name)
        });
        drop(current);

        retire(old, &actual)
    }
}

impl std::fmt::Debug for BoardProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardProxy")
            .field("analogs", &self.analog_reader_names())
            .field("digital_interrupts", &self.digital_interrupt_names())
            .finish()
    }
}

fn stale_names<T: ?Sized>(
    proxies: &RwLock<BTreeMap<String, Arc<ResourceProxy<T>>>>,
    current: &[String],
) -> Vec<String> {
    proxies
        .read()
        .keys()
        .filter(|name| !current.contains(name))
        .cloned()
        .collect()
}

fn updated_names<T: ?Sized>(
    proxies: &RwLock<BTreeMap<String, Arc<ResourceProxy<T>>>>,
    removed: &[String],
    added: &[String],
) -> Vec<String> {
    let mut names: Vec<String> = proxies
        .read()
        .keys()
        .filter(|name| !removed.contains(name))
        .cloned()
        .collect();
    for name in added {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

fn sync_sub_proxies<T: ?Sized>(
    proxies: &RwLock<BTreeMap<String, Arc<ResourceProxy<T>>>>,
    removed: &[String],
    updated: &[String],
    lookup: impl Fn(&str) -> Option<Arc<T>>,
) {
    let mut proxies = proxies.write();
    for name in removed {
        proxies.remove(name);
    }
    for name in updated {
        match lookup(name) {
            Some(actual) => match proxies.get(name) {
                Some(proxy) => {
                    proxy.replace(actual);
                }
                None => {
                    proxies.insert(name.clone(), ResourceProxy::new(actual));
                }
            },
            None => {
                warn!(sub_resource = %name, "Board does not provide sub-resource");
                proxies.remove(name);
            }
        }
    }
}

/// The capability a sensor was registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Sensor,
    Compass,
    RelativeCompass,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sensor => write!(f, "sensor"),
            Self::Compass => write!(f, "compass"),
            Self::RelativeCompass => write!(f, "relative compass"),
        }
    }
}

/// Proxy for a sensor, specialized to the richest capability it offers
///
/// The variant is fixed when the sensor is first registered. A replacement
/// must offer the same capability.
#[derive(Debug, Clone)]
pub enum SensorHandle {
    Sensor(Arc<ResourceProxy<dyn Sensor>>),
    Compass(Arc<ResourceProxy<dyn Compass>>),
    RelativeCompass(Arc<ResourceProxy<dyn RelativeCompass>>),
}

impl SensorHandle {
    /// Wrap a sensor, checking relative compass first, then compass
    pub fn new(actual: Arc<dyn Sensor>) -> Self {
        if let Some(relative) = actual.clone().as_relative_compass() {
            return Self::RelativeCompass(ResourceProxy::new(relative));
        }
        if let Some(compass) = actual.clone().as_compass() {
            return Self::Compass(ResourceProxy::new(compass));
        }
        Self::Sensor(ResourceProxy::new(actual))
    }

    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Sensor(_) => SensorKind::Sensor,
            Self::Compass(_) => SensorKind::Compass,
            Self::RelativeCompass(_) => SensorKind::RelativeCompass,
        }
    }

    /// A fresh proxy of the same kind around the current instance
    pub fn rewrap(&self) -> Self {
        match self {
            Self::Sensor(p) => Self::Sensor(ResourceProxy::new(p.actual())),
            Self::Compass(p) => Self::Compass(ResourceProxy::new(p.actual())),
            Self::RelativeCompass(p) => Self::RelativeCompass(ResourceProxy::new(p.actual())),
        }
    }

    /// True when both handles share the same proxy
    pub fn same_proxy(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sensor(a), Self::Sensor(b)) => Arc::ptr_eq(a, b),
            (Self::Compass(a), Self::Compass(b)) => Arc::ptr_eq(a, b),
            (Self::RelativeCompass(a), Self::RelativeCompass(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub async fn readings(&self) -> anyhow::Result<Vec<f64>> {
        match self {
            Self::Sensor(p) => p.actual().readings().await,
            Self::Compass(p) => p.actual().readings().await,
            Self::RelativeCompass(p) => p.actual().readings().await,
        }
    }

    pub async fn heading(&self) -> anyhow::Result<f64> {
        match self {
            Self::Sensor(_) => anyhow::bail!("sensor is not a compass"),
            Self::Compass(p) => p.actual().heading().await,
            Self::RelativeCompass(p) => p.actual().heading().await,
        }
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        match self {
            Self::Sensor(p) => p.close().await,
            Self::Compass(p) => p.close().await,
            Self::RelativeCompass(p) => p.close().await,
        }
    }

    /// Fail unless `replacement` can be swapped into this handle
    pub(crate) fn check_replace(&self, name: &str, replacement: &Self) -> Result<(), RobotError> {
        if self.kind() != replacement.kind() {
            return Err(RobotError::SensorKindMismatch {
                name: name.to_string(),
                existing: self.kind(),
                replacement: replacement.kind(),
            });
        }
        Ok(())
    }

    /// Swap in the instance behind `replacement`.
    ///
    /// Kinds must have been checked with [`Self::check_replace`]; mismatched
    /// kinds leave the handle untouched.
    pub(crate) fn swap_from(&self, replacement: &Self) -> Option<CloseFuture> {
        match (self, replacement) {
            (Self::Sensor(a), Self::Sensor(b)) => a.swap(b.actual()),
            (Self::Compass(a), Self::Compass(b)) => a.swap(b.actual()),
            (Self::RelativeCompass(a), Self::RelativeCompass(b)) => a.swap(b.actual()),
            _ => None,
        }
    }
}
