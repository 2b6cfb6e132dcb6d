//! Scene-set lifecycle coordination
//!
//! A [`SceneSet`] owns an ordered collection of [`SceneConfig`]s and drives
//! them through a four-state lifecycle:
//!
//! ```text
//! Unloaded --initialize()--> Loading --> Loaded
//! Loaded   --load(key)-----> Loading --> Loaded
//! Loaded   --teardown()----> Unloading --> Unloaded
//! ```
//!
//! Only one transition runs at a time. Every operation checks and sets the
//! status under a lock, then does its actual work (awaiting the backend)
//! outside of it. A call made while the status doesn't match its precondition
//! fails with [`SceneSetError::StateViolation`] instead of waiting.
//!
//! On failure every operation puts the status back where it was before the
//! call, so the set always stays usable.
//!
//! Template instances produced by [`SceneSet::load`] are tracked in a live set
//! until they are destroyed. The set subscribes to a [`DestructionChannel`] so
//! instances destroyed elsewhere are forgotten, and [`SceneSet::teardown`]
//! destroys whatever is left.
//!
//! # Example
//! ```ignore
//! let set = SceneSet::new(host.clone(), DestructionChannel::global(), configs);
//!
//! set.initialize().await?;          // loads every singleton
//! let enemy = set.load("enemy").await?;   // template: a fresh instance
//! set.teardown().await?;            // unloads singletons and live instances
//! set.close().await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{wait_until_done, SceneBackend};
use crate::definition::SceneSetDefinition;
use crate::destruction::{DestructionChannel, SubscriptionId};
use crate::error::{BackendError, DefinitionError, SceneSetError};
use crate::scene_config::{LoadMode, SceneConfig, SceneConfigMap};
use crate::SceneHandle;

/// Lifecycle status of a [`SceneSet`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SceneSetStatus {
    /// Nothing loaded; `initialize` is allowed
    Unloaded,
    /// `initialize` or `load` in progress
    Loading,
    /// Ready; `load` and `teardown` are allowed
    Loaded,
    /// `teardown` in progress
    Unloading,
}

impl fmt::Display for SceneSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SceneSetStatus::Unloaded => "Unloaded",
            SceneSetStatus::Loading => "Loading",
            SceneSetStatus::Loaded => "Loaded",
            SceneSetStatus::Unloading => "Unloading",
        };
        f.write_str(name)
    }
}

/// Resets the status when dropped, whichever way the operation exits
struct RestoreStatus<'a> {
    status: &'a Mutex<SceneSetStatus>,
    to: SceneSetStatus,
}

impl Drop for RestoreStatus<'_> {
    fn drop(&mut self) {
        *self.status.lock() = self.to;
    }
}

/// Coordinates loading and unloading of a named collection of scenes
pub struct SceneSet<B: SceneBackend> {
    name: String,
    backend: Arc<B>,
    configs: SceneConfigMap,
    status: Mutex<SceneSetStatus>,
    /// Template instances that have not been destroyed yet
    live: Arc<Mutex<HashSet<SceneHandle>>>,
    channel: Arc<DestructionChannel>,
    subscription: Option<SubscriptionId>,
}

impl<B: SceneBackend> SceneSet<B> {
    /// Create an unloaded scene set and subscribe it to `channel`
    pub fn new(backend: Arc<B>, channel: Arc<DestructionChannel>, configs: SceneConfigMap) -> Self {
        let live: Arc<Mutex<HashSet<SceneHandle>>> = Arc::default();

        let tracked = Arc::clone(&live);
        let subscription = channel.subscribe(move |handle| {
            if tracked.lock().remove(&handle) {
                log::debug!("Template instance {:?} destroyed externally", handle);
            }
        });

        Self {
            name: "scene set".to_string(),
            backend,
            configs,
            status: Mutex::new(SceneSetStatus::Unloaded),
            live,
            channel,
            subscription: Some(subscription),
        }
    }

    /// Build a scene set from a definition
    pub fn from_definition(
        definition: &SceneSetDefinition,
        backend: Arc<B>,
        channel: Arc<DestructionChannel>,
    ) -> Result<Self, DefinitionError> {
        let configs = definition.to_configs()?;
        Ok(Self::new(backend, channel, configs).with_name(definition.name.clone()))
    }

    /// Set the name used in log messages
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status
    pub fn status(&self) -> SceneSetStatus {
        *self.status.lock()
    }

    /// Configured keys in definition order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.configs.keys()
    }

    /// Config registered under `key`
    pub fn config(&self, key: &str) -> Option<&SceneConfig> {
        self.configs.get(key)
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Snapshot of the live template instances
    pub fn live_instances(&self) -> Vec<SceneHandle> {
        self.live.lock().iter().copied().collect()
    }

    pub fn live_instance_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Whether `handle` is a live template instance of this set
    pub fn contains_live(&self, handle: SceneHandle) -> bool {
        self.live.lock().contains(&handle)
    }

    /// Check-and-set the status in one locked step
    fn transition(&self, expected: SceneSetStatus, next: SceneSetStatus) -> Result<(), SceneSetError> {
        let mut status = self.status.lock();
        if *status != expected {
            return Err(SceneSetError::StateViolation {
                expected,
                actual: *status,
            });
        }
        *status = next;
        Ok(())
    }

    fn set_status(&self, next: SceneSetStatus) {
        *self.status.lock() = next;
    }

    /// Load every singleton scene, in definition order
    ///
    /// Requires [`SceneSetStatus::Unloaded`]. Template scenes are not
    /// preloaded. If a load fails, singletons loaded by this call are
    /// unloaded again and the set returns to `Unloaded`.
    pub async fn initialize(&self) -> Result<(), SceneSetError> {
        self.transition(SceneSetStatus::Unloaded, SceneSetStatus::Loading)?;
        log::info!("Initializing {} ({} scenes)", self.name, self.configs.len());

        let mut loaded: Vec<&SceneConfig> = Vec::new();
        for (key, config) in self.configs.iter() {
            if config.mode() != LoadMode::Singleton {
                continue;
            }
            log::debug!("Loading singleton '{}' from '{}'", key, config.reference().path());
            match config.load(&*self.backend).await {
                Ok(_) => loaded.push(config),
                Err(err) => {
                    log::warn!("{}: singleton '{}' failed to load: {}", self.name, key, err);
                    self.unload_singletons(loaded.into_iter().rev()).await;
                    self.set_status(SceneSetStatus::Unloaded);
                    return Err(err.into());
                }
            }
        }

        self.set_status(SceneSetStatus::Loaded);
        log::info!("{} loaded", self.name);
        Ok(())
    }

    /// Best-effort unload used to roll back a failed initialize
    async fn unload_singletons<'a>(&self, configs: impl Iterator<Item = &'a SceneConfig>) {
        for config in configs {
            if let Err(err) = config.unload(&*self.backend).await {
                log::warn!(
                    "{}: rollback unload of '{}' failed: {}",
                    self.name,
                    config.reference().path(),
                    err
                );
            }
        }
    }

    /// Resolve the scene configured under `key`
    ///
    /// Requires [`SceneSetStatus::Loaded`]. Singletons return their shared
    /// instance; templates load a new instance and track it as live. The set
    /// is back in `Loaded` when this returns, whether it succeeded or not.
    pub async fn load(&self, key: &str) -> Result<SceneHandle, SceneSetError> {
        self.transition(SceneSetStatus::Loaded, SceneSetStatus::Loading)?;
        let _restore = RestoreStatus {
            status: &self.status,
            to: SceneSetStatus::Loaded,
        };

        let config = self
            .configs
            .get(key)
            .ok_or_else(|| SceneSetError::KeyNotFound(key.to_string()))?;

        let handle = config.load(&*self.backend).await?;

        if config.mode() == LoadMode::Template && !handle.is_null() {
            // Insert before checking validity: a destruction after the insert
            // is pruned by the channel handler, one before it is caught here
            self.live.lock().insert(handle);
            if self.backend.is_valid(handle) {
                log::debug!("{}: instantiated template '{}' as {:?}", self.name, key, handle);
            } else {
                self.live.lock().remove(&handle);
            }
        }
        Ok(handle)
    }

    /// Unload every singleton and destroy every live template instance
    ///
    /// Requires [`SceneSetStatus::Loaded`]. Stops at the first backend
    /// failure and returns to `Loaded`; calling `teardown` again picks up
    /// whatever is still loaded.
    pub async fn teardown(&self) -> Result<(), SceneSetError> {
        self.transition(SceneSetStatus::Loaded, SceneSetStatus::Unloading)?;
        log::info!("Tearing down {}", self.name);

        match self.unload_everything().await {
            Ok(()) => {
                self.set_status(SceneSetStatus::Unloaded);
                log::info!("{} unloaded", self.name);
                Ok(())
            }
            Err(err) => {
                log::warn!("{}: teardown failed: {}", self.name, err);
                self.set_status(SceneSetStatus::Loaded);
                Err(err.into())
            }
        }
    }

    async fn unload_everything(&self) -> Result<(), BackendError> {
        for (key, config) in self.configs.iter() {
            if config.mode() == LoadMode::Singleton {
                log::debug!("Unloading singleton '{}'", key);
                config.unload(&*self.backend).await?;
            }
        }

        // The destruction channel may prune the live set while we iterate
        let snapshot = self.live_instances();
        log::debug!("{}: destroying {} template instances", self.name, snapshot.len());
        for handle in snapshot {
            if self.backend.is_valid(handle) {
                let operation = self.backend.unload(handle)?;
                wait_until_done(operation).await?;
            }
            self.live.lock().remove(&handle);
        }
        Ok(())
    }

    /// Tear down if loaded, then release the destruction subscription
    ///
    /// The subscription is released even when teardown fails.
    pub async fn close(mut self) -> Result<(), SceneSetError> {
        let result = if self.status() == SceneSetStatus::Loaded {
            self.teardown().await
        } else {
            Ok(())
        };
        self.release_subscription();
        result
    }

    fn release_subscription(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.channel.unsubscribe(id);
        }
    }
}

impl<B: SceneBackend> Drop for SceneSet<B> {
    fn drop(&mut self) {
        if self.subscription.is_some() {
            let status = self.status();
            if status != SceneSetStatus::Unloaded {
                log::warn!("{} dropped while {}; call close() to unload it", self.name, status);
            }
        }
        self.release_subscription();
    }
}

impl<B: SceneBackend> fmt::Debug for SceneSet<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneSet")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("scenes", &self.configs.len())
            .field("live_instances", &self.live_instance_count())
            .finish()
    }
}
