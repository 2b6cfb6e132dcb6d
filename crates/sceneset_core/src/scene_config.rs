//! Per-scene load policy
//!
//! A [`SceneConfig`] pairs a [`SceneReference`] with a [`LoadMode`] and an
//! [`IsolationMode`]. Singleton configs cache the handle they loaded and serve
//! later requests from that cache for as long as the scene stays alive;
//! template configs load a fresh instance on every request.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{wait_until_done, SceneBackend};
use crate::error::{BackendError, DefinitionError};
use crate::reference::{IsolationMode, SceneReference};
use crate::SceneHandle;

/// How a config answers load requests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadMode {
    /// At most one live instance, shared by every request
    #[default]
    Singleton,
    /// A new, independently tracked instance per request
    Template,
}

/// Load policy for one scene in a scene set
#[derive(Debug)]
pub struct SceneConfig {
    reference: SceneReference,
    mode: LoadMode,
    isolation: IsolationMode,
    /// Handle from the last successful singleton load
    cached: Mutex<Option<SceneHandle>>,
}

impl SceneConfig {
    /// Create a config with shared isolation
    pub fn new(reference: SceneReference, mode: LoadMode) -> Self {
        Self {
            reference,
            mode,
            isolation: IsolationMode::default(),
            cached: Mutex::new(None),
        }
    }

    /// Shorthand for a singleton config at `path`
    pub fn singleton(path: impl Into<String>) -> Self {
        Self::new(SceneReference::new(path), LoadMode::Singleton)
    }

    /// Shorthand for a template config at `path`
    pub fn template(path: impl Into<String>) -> Self {
        Self::new(SceneReference::new(path), LoadMode::Template)
    }

    /// Set the isolation mode used when loading
    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn reference(&self) -> &SceneReference {
        &self.reference
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn isolation(&self) -> IsolationMode {
        self.isolation
    }

    /// The cached singleton handle, if one is set
    ///
    /// The handle may be stale; [`load`](Self::load) revalidates it.
    pub fn cached_handle(&self) -> Option<SceneHandle> {
        *self.cached.lock()
    }

    /// Resolve this config to a scene handle
    ///
    /// Singletons return the cached handle without a backend call while it is
    /// valid and loaded; otherwise the scene is loaded and, for singletons,
    /// the result replaces the cache.
    pub async fn load<B: SceneBackend>(&self, backend: &B) -> Result<SceneHandle, BackendError> {
        if self.mode == LoadMode::Singleton {
            if let Some(handle) = self.cached_handle() {
                if backend.is_valid(handle) && backend.is_loaded(handle) {
                    return Ok(handle);
                }
            }
        }

        let handle = self.reference.load(backend, self.isolation).await?;

        if self.mode == LoadMode::Singleton && backend.is_valid(handle) {
            *self.cached.lock() = Some(handle);
        }
        Ok(handle)
    }

    /// Destroy the cached singleton instance
    ///
    /// No-op for templates, whose instances belong to the scene set. A
    /// missing or already-destroyed singleton is also a no-op.
    pub async fn unload<B: SceneBackend>(&self, backend: &B) -> Result<(), BackendError> {
        if self.mode == LoadMode::Template {
            return Ok(());
        }

        let Some(handle) = self.cached_handle() else {
            return Ok(());
        };
        if backend.is_valid(handle) {
            let operation = backend.unload(handle)?;
            wait_until_done(operation).await?;
        }

        // Keep the cache on failure so a retry unloads the same instance
        let mut cached = self.cached.lock();
        if *cached == Some(handle) {
            *cached = None;
        }
        Ok(())
    }
}

/// Ordered mapping from key to [`SceneConfig`]
///
/// Iteration follows insertion order. Keys are unique.
#[derive(Debug, Default)]
pub struct SceneConfigMap {
    entries: Vec<(String, SceneConfig)>,
    index: HashMap<String, usize>,
}

impl SceneConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a config under `key`
    pub fn insert(&mut self, key: impl Into<String>, config: SceneConfig) -> Result<(), DefinitionError> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(DefinitionError::DuplicateKey(key));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, config));
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, config: SceneConfig) -> Result<Self, DefinitionError> {
        self.insert(key, config)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&SceneConfig> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Iterate configs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SceneConfig)> {
        self.entries.iter().map(|(key, config)| (key.as_str(), config))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
