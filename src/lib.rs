//! Scenesets - scene-set lifecycle management
//!
//! Re-exports the coordinator crate and adds application-level configuration.

pub mod config;

pub use sceneset_core::*;
