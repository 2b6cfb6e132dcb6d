//! Scene-set lifecycle coordination
//!
//! This crate manages named collections of loadable scenes:
//!
//! - [`SceneHandle`] - Generational handle to a loaded scene instance
//! - [`SceneBackend`] - The external loader/unloader the coordinator drives
//! - [`SceneReference`] - A scene path plus an async additive load
//! - [`SceneConfig`] - Singleton/template load policy for one scene
//! - [`SceneSet`] - The lifecycle coordinator (initialize, load, teardown)
//! - [`DestructionChannel`] - Process-wide "scene destroyed" notifications
//! - [`SceneSetDefinition`] - RON-serializable description of a scene set
//! - [`SceneHost`] - In-process backend with an ordered worker thread

mod backend;
mod definition;
mod destruction;
mod error;
mod handle;
mod reference;
mod scene_config;
mod scene_host;
mod scene_set;

pub use backend::{wait_until_done, Completion, Finished, PendingOperation, SceneBackend};
pub use definition::{SceneEntry, SceneSetDefinition};
pub use destruction::{DestructionChannel, SubscriptionId};
pub use error::{BackendError, DefinitionError, SceneSetError};
pub use handle::SceneHandle;
pub use reference::{IsolationMode, SceneReference};
pub use scene_config::{LoadMode, SceneConfig, SceneConfigMap};
pub use scene_host::{HostOperation, HostedScene, HostedState, SceneHost, SceneHostConfig};
pub use scene_set::{SceneSet, SceneSetStatus};
