//! Error types for scene-set operations
//!
//! Each layer has its own error enum:
//! - [`BackendError`] - failures reported by a [`SceneBackend`](crate::SceneBackend)
//! - [`SceneSetError`] - coordinator errors (state violations, unknown keys)
//! - [`DefinitionError`] - reading, writing or validating scene-set definitions

use std::io;

use thiserror::Error;

use crate::scene_set::SceneSetStatus;

/// Error reported by a scene backend while loading or unloading
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend does not know how to load this path
    #[error("unknown scene path: {0}")]
    UnknownPath(String),
    /// A load completed but no new scene appeared in the backend
    #[error("load of '{0}' completed without producing a scene")]
    Unresolved(String),
    /// The backend's worker has shut down and can no longer accept requests
    #[error("scene host is closed")]
    HostClosed,
    /// Any other backend-specific failure
    #[error("backend failure: {0}")]
    Failed(String),
}

/// Error type for scene-set coordinator operations
#[derive(Debug, Error)]
pub enum SceneSetError {
    /// The operation required a different status than the current one
    #[error("scene set is {actual}, expected {expected}")]
    StateViolation {
        /// Status the operation requires
        expected: SceneSetStatus,
        /// Status the set was actually in
        actual: SceneSetStatus,
    },
    /// No config is registered under this key
    #[error("no scene configured for key '{0}'")]
    KeyNotFound(String),
    /// The backend failed; propagated unchanged
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Error loading, saving or validating a scene-set definition
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// IO error (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Parse error (invalid RON syntax)
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Serialization error
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),
    /// The same key appears twice
    #[error("duplicate scene key '{0}'")]
    DuplicateKey(String),
}
