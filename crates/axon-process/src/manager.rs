//! Process manager with add-or-replace bookkeeping

use axon_core::ProcessConfig;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::process::{ManagedProcess, OsProcess, ProcessError};

/// Owns a set of processes keyed by ID
///
/// Cloning produces independent bookkeeping that refers to the same
/// process instances.
pub struct ProcessManager {
    processes: Mutex<BTreeMap<String, Arc<dyn ManagedProcess>>>,
    started: AtomicBool,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ProcessManager {
    fn clone(&self) -> Self {
        Self {
            processes: Mutex::new(self.processes.lock().clone()),
            started: AtomicBool::new(self.started.load(Ordering::SeqCst)),
        }
    }
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("processes", &self.process_ids())
            .field("started", &self.is_started())
            .finish()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(BTreeMap::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Create an [`OsProcess`] from config and add it without replacement
    pub async fn add_process_from_config(
        &self,
        config: &ProcessConfig,
    ) -> Result<Arc<dyn ManagedProcess>, ProcessError> {
        let process: Arc<dyn ManagedProcess> = Arc::new(OsProcess::new(config.clone()));
        self.add_process(process.clone(), false).await?;
        Ok(process)
    }

    /// Add a process, returning the one it replaced.
    ///
    /// Without `replace`, an existing ID is an error. If the manager has
    /// already been started, the new process is started as well; when that
    /// start fails the previous entry for the ID is put back.
    pub async fn add_process(
        &self,
        process: Arc<dyn ManagedProcess>,
        replace: bool,
    ) -> Result<Option<Arc<dyn ManagedProcess>>, ProcessError> {
        let id = process.id().to_string();
        let replaced = {
            let mut processes = self.processes.lock();
            if !replace && processes.contains_key(&id) {
                return Err(ProcessError::AlreadyExists(id));
            }
            processes.insert(id.clone(), process.clone())
        };

        if self.is_started() {
            if let Err(e) = process.start().await {
                self.restore(&id, &process, replaced);
                return Err(e);
            }
        }
        debug!(process = %id, replaced = replaced.is_some(), "Added process");
        Ok(replaced)
    }

    /// Undo an add of `added` under `id`, putting `previous` back
    fn restore(
        &self,
        id: &str,
        added: &Arc<dyn ManagedProcess>,
        previous: Option<Arc<dyn ManagedProcess>>,
    ) {
        let mut processes = self.processes.lock();
        if !processes.get(id).is_some_and(|current| Arc::ptr_eq(current, added)) {
            return;
        }
        match previous {
            Some(previous) => {
                processes.insert(id.to_string(), previous);
            }
            None => {
                processes.remove(id);
            }
        }
    }

    pub fn remove_process_by_id(&self, id: &str) -> Option<Arc<dyn ManagedProcess>> {
        self.processes.lock().remove(id)
    }

    pub fn process_by_id(&self, id: &str) -> Option<Arc<dyn ManagedProcess>> {
        self.processes.lock().get(id).cloned()
    }

    pub fn process_ids(&self) -> Vec<String> {
        self.processes.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.lock().is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Vec<Arc<dyn ManagedProcess>> {
        self.processes.lock().values().cloned().collect()
    }

    /// Start every process, stopping at the first failure
    pub async fn start(&self) -> Result<(), ProcessError> {
        self.started.store(true, Ordering::SeqCst);
        let processes = self.snapshot();
        for process in &processes {
            process.start().await?;
        }
        if !processes.is_empty() {
            info!(count = processes.len(), "Started managed processes");
        }
        Ok(())
    }

    /// Stop every process, attempting all of them even when some fail
    pub async fn stop(&self) -> Result<(), ProcessError> {
        self.started.store(false, Ordering::SeqCst);
        let mut errors = Vec::new();
        for process in self.snapshot() {
            if let Err(e) = process.stop().await {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProcessError::Stop(errors))
        }
    }
}

/// Add-or-replace every process of `src` into `dst`.
///
/// Returns the processes of `dst` that were replaced; they are no longer
/// managed by `dst` and must be stopped by the caller. If any add fails,
/// `dst` is put back to the processes it held before the merge.
pub async fn merge_add(
    dst: &ProcessManager,
    src: &ProcessManager,
) -> Result<Vec<Arc<dyn ManagedProcess>>, ProcessError> {
    let mut added = Vec::new();
    for process in src.snapshot() {
        match dst.add_process(process.clone(), true).await {
            Ok(previous) => added.push((process, previous)),
            Err(e) => {
                for (process, previous) in added.into_iter().rev() {
                    dst.restore(process.id(), &process, previous);
                }
                return Err(e);
            }
        }
    }
    Ok(added.into_iter().filter_map(|(_, previous)| previous).collect())
}

/// Remove every process ID of `src` from `dst`, returning what was removed
pub fn merge_remove(dst: &ProcessManager, src: &ProcessManager) -> Vec<Arc<dyn ManagedProcess>> {
    src.process_ids()
        .iter()
        .filter_map(|id| dst.remove_process_by_id(id))
        .collect()
}
