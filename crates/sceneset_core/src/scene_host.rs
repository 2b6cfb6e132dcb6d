//! In-process scene backend
//!
//! [`SceneHost`] is a [`SceneBackend`] that keeps loaded scenes in a
//! generational slot map and finishes load/unload requests on a dedicated
//! worker thread. Requests are handled strictly in the order they were
//! issued. A load reserves its scene slot and its index in an append-only
//! request log the moment it is requested; destroying a scene never shifts
//! that log, so count-diffing callers always find their own scene.
//!
//! Every destruction, whether requested through [`SceneBackend::unload`] or
//! done directly with [`SceneHost::destroy`], is announced on the host's
//! [`DestructionChannel`].
//!
//! # Example
//! ```ignore
//! let host = Arc::new(SceneHost::new(DestructionChannel::global()));
//! let op = host.load_additive("levels/hub", IsolationMode::Shared)?;
//! pollster::block_on(wait_until_done(op))?;
//! ```

use std::collections::HashSet;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::task::Waker;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::SlotMap;

use crate::backend::{PendingOperation, SceneBackend};
use crate::destruction::DestructionChannel;
use crate::error::BackendError;
use crate::reference::IsolationMode;
use crate::SceneHandle;

/// Loading state of a hosted scene
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostedState {
    /// Requested, not finished yet
    Loading,
    /// Ready for use
    Loaded,
}

/// A scene owned by the host
#[derive(Clone, Debug)]
pub struct HostedScene {
    pub path: String,
    pub isolation: IsolationMode,
    pub state: HostedState,
}

/// Timing and catalog settings for a [`SceneHost`]
#[derive(Clone, Debug, Default)]
pub struct SceneHostConfig {
    /// Simulated time the worker spends on each load
    pub load_delay: Duration,
    /// Simulated time the worker spends on each unload
    pub unload_delay: Duration,
    /// If set, only these paths can be loaded
    pub catalog: Option<HashSet<String>>,
}

type OperationResult = Result<(), BackendError>;

/// Result and waiting task of one request
#[derive(Debug, Default)]
struct SlotState {
    result: Option<OperationResult>,
    waker: Option<Waker>,
}

/// Completion slot shared between a [`HostOperation`] and the worker
type Slot = Arc<Mutex<SlotState>>;

fn fill(slot: &Slot, result: OperationResult) {
    let waker = {
        let mut state = slot.lock();
        state.result = Some(result);
        state.waker.take()
    };
    if let Some(waker) = waker {
        waker.wake();
    }
}

/// Poll-based handle to a host request
#[derive(Debug)]
pub struct HostOperation {
    slot: Slot,
}

impl HostOperation {
    fn pending() -> (Self, Slot) {
        let slot: Slot = Arc::default();
        (Self { slot: slot.clone() }, slot)
    }

    fn finished(result: OperationResult) -> Self {
        let (operation, slot) = Self::pending();
        slot.lock().result = Some(result);
        operation
    }

    /// Whether the worker has finished this request (non-consuming)
    pub fn is_done(&self) -> bool {
        self.slot.lock().result.is_some()
    }
}

impl PendingOperation for HostOperation {
    type Output = OperationResult;

    fn poll_done(&mut self) -> Option<OperationResult> {
        self.slot.lock().result.take()
    }

    fn register_waker(&mut self, waker: &Waker) -> bool {
        let mut state = self.slot.lock();
        if state.result.is_some() {
            // Finished between poll_done and now
            waker.wake_by_ref();
        } else {
            state.waker = Some(waker.clone());
        }
        true
    }
}

enum HostRequest {
    Load { handle: SceneHandle, slot: Slot },
    Unload { handle: SceneHandle, slot: Slot },
}

#[derive(Default)]
struct HostScenes {
    /// Live scenes; the only source of truth for validity
    scenes: SlotMap<SceneHandle, HostedScene>,
    /// Every load request in issue order, append-only
    requested: Vec<SceneHandle>,
}

struct HostShared {
    scenes: Mutex<HostScenes>,
    channel: Arc<DestructionChannel>,
    config: SceneHostConfig,
}

impl HostShared {
    fn complete_load(&self, handle: SceneHandle) -> OperationResult {
        if !self.config.load_delay.is_zero() {
            thread::sleep(self.config.load_delay);
        }

        let mut scenes = self.scenes.lock();
        let Some(scene) = scenes.scenes.get_mut(handle) else {
            // Destroyed before it finished loading
            return Err(BackendError::Failed("scene destroyed while loading".to_string()));
        };

        let known = match &self.config.catalog {
            Some(catalog) => catalog.contains(&scene.path),
            None => true,
        };
        if known {
            scene.state = HostedState::Loaded;
            Ok(())
        } else {
            let path = scene.path.clone();
            scenes.scenes.remove(handle);
            Err(BackendError::UnknownPath(path))
        }
    }

    fn complete_unload(&self, handle: SceneHandle) -> OperationResult {
        if !self.config.unload_delay.is_zero() {
            thread::sleep(self.config.unload_delay);
        }
        self.destroy(handle);
        Ok(())
    }

    fn destroy(&self, handle: SceneHandle) -> bool {
        let removed = self.scenes.lock().scenes.remove(handle);
        match removed {
            Some(scene) => {
                log::debug!("Destroyed scene '{}' ({:?})", scene.path, handle);
                self.channel.notify_destroyed(handle);
                true
            }
            None => false,
        }
    }
}

/// Scene backend with a FIFO worker thread
///
/// The worker runs until the host is dropped.
pub struct SceneHost {
    shared: Arc<HostShared>,
    sender: Mutex<Sender<HostRequest>>,
}

impl SceneHost {
    /// Create a host with no latency and no catalog
    pub fn new(channel: Arc<DestructionChannel>) -> Self {
        Self::with_config(channel, SceneHostConfig::default())
    }

    /// Create a host with custom settings
    pub fn with_config(channel: Arc<DestructionChannel>, config: SceneHostConfig) -> Self {
        let shared = Arc::new(HostShared {
            scenes: Mutex::new(HostScenes::default()),
            channel,
            config,
        });
        let (request_tx, request_rx) = mpsc::channel::<HostRequest>();

        let worker = Arc::clone(&shared);
        thread::spawn(move || {
            // Worker loop: process requests in order until the host is dropped
            while let Ok(request) = request_rx.recv() {
                let (slot, result) = match request {
                    HostRequest::Load { handle, slot } => (slot, worker.complete_load(handle)),
                    HostRequest::Unload { handle, slot } => (slot, worker.complete_unload(handle)),
                };
                fill(&slot, result);
            }
        });

        Self {
            shared,
            sender: Mutex::new(request_tx),
        }
    }

    /// The channel this host announces destructions on
    pub fn channel(&self) -> &Arc<DestructionChannel> {
        &self.shared.channel
    }

    /// Destroy a scene immediately, outside any scene set
    ///
    /// Returns false if the handle was already invalid.
    pub fn destroy(&self, handle: SceneHandle) -> bool {
        self.shared.destroy(handle)
    }

    /// Snapshot of a hosted scene
    pub fn scene(&self, handle: SceneHandle) -> Option<HostedScene> {
        self.shared.scenes.lock().scenes.get(handle).cloned()
    }

    /// Handles of every hosted scene, in request order
    pub fn handles(&self) -> Vec<SceneHandle> {
        let scenes = self.shared.scenes.lock();
        scenes
            .requested
            .iter()
            .copied()
            .filter(|h| scenes.scenes.contains_key(*h))
            .collect()
    }

    fn submit(&self, request: HostRequest) -> Result<(), BackendError> {
        self.sender.lock().send(request).map_err(|_| BackendError::HostClosed)
    }
}

impl SceneBackend for SceneHost {
    type Operation = HostOperation;

    fn scene_count(&self) -> usize {
        self.shared.scenes.lock().requested.len()
    }

    fn scene_at(&self, index: usize) -> SceneHandle {
        self.shared.scenes.lock().requested.get(index).copied().unwrap_or_default()
    }

    fn load_additive(&self, path: &str, isolation: IsolationMode) -> Result<HostOperation, BackendError> {
        let handle = {
            let mut scenes = self.shared.scenes.lock();
            let handle = scenes.scenes.insert(HostedScene {
                path: path.to_string(),
                isolation,
                state: HostedState::Loading,
            });
            scenes.requested.push(handle);
            handle
        };

        let (operation, slot) = HostOperation::pending();
        if let Err(err) = self.submit(HostRequest::Load { handle, slot }) {
            self.shared.scenes.lock().scenes.remove(handle);
            return Err(err);
        }
        Ok(operation)
    }

    fn unload(&self, handle: SceneHandle) -> Result<HostOperation, BackendError> {
        if !self.is_valid(handle) {
            return Ok(HostOperation::finished(Ok(())));
        }
        let (operation, slot) = HostOperation::pending();
        self.submit(HostRequest::Unload { handle, slot })?;
        Ok(operation)
    }

    fn is_valid(&self, handle: SceneHandle) -> bool {
        self.shared.scenes.lock().scenes.contains_key(handle)
    }

    fn is_loaded(&self, handle: SceneHandle) -> bool {
        self.shared
            .scenes
            .lock()
            .scenes
            .get(handle)
            .is_some_and(|scene| scene.state == HostedState::Loaded)
    }
}
