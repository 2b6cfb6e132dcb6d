//! References to loadable scenes

use serde::{Deserialize, Serialize};

use crate::backend::{wait_until_done, SceneBackend};
use crate::error::BackendError;
use crate::SceneHandle;

/// Whether a loaded scene simulates physics in its own space
///
/// Isolated scenes don't interact with unrelated scenes that are already loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationMode {
    /// Share the default simulation space
    #[default]
    Shared,
    /// Independent 2D physics space
    Physics2D,
    /// Independent 3D physics space
    Physics3D,
}

/// Identifies a loadable scene by path
///
/// An empty path is an unspecified reference: loading it yields the null
/// handle and never reaches the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneReference {
    path: String,
}

impl SceneReference {
    /// Create a reference to the scene at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// The scene path (possibly empty)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this reference points at nothing
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Load the referenced scene additively and return its handle
    ///
    /// The new scene is found by comparing the backend's scene count before
    /// and after the request. Correct attribution under overlapping requests
    /// relies on the backend processing loads in request order.
    pub async fn load<B: SceneBackend>(
        &self,
        backend: &B,
        isolation: IsolationMode,
    ) -> Result<SceneHandle, BackendError> {
        if self.is_empty() {
            return Ok(SceneHandle::null());
        }

        let before = backend.scene_count();
        let operation = backend.load_additive(&self.path, isolation)?;
        wait_until_done(operation).await?;

        let after = backend.scene_count();
        if after <= before {
            return Err(BackendError::Unresolved(self.path.clone()));
        }

        let handle = backend.scene_at(before);
        if handle.is_null() {
            return Err(BackendError::Unresolved(self.path.clone()));
        }
        log::debug!("Loaded scene '{}' ({:?})", self.path, isolation);
        Ok(handle)
    }
}
