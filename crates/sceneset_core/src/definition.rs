//! Scene-set definitions
//!
//! A [`SceneSetDefinition`] is the serializable description of a scene set:
//! a name plus an ordered list of entries. Definitions are stored as RON,
//! for example:
//!
//! ```ron
//! SceneSetDefinition(
//!     name: "Level 1",
//!     scenes: [
//!         (key: "hub", path: "levels/hub", mode: Singleton, isolation: Physics3D),
//!         (key: "enemy", path: "actors/enemy", mode: Template),
//!     ],
//! )
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::reference::{IsolationMode, SceneReference};
use crate::scene_config::{LoadMode, SceneConfig, SceneConfigMap};

/// One keyed scene in a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneEntry {
    /// Lookup key, unique within the set
    pub key: String,
    /// Scene path; empty means "unspecified"
    #[serde(default)]
    pub path: String,
    /// Singleton unless stated otherwise
    #[serde(default)]
    pub mode: LoadMode,
    #[serde(default)]
    pub isolation: IsolationMode,
}

impl SceneEntry {
    pub fn new(key: impl Into<String>, path: impl Into<String>, mode: LoadMode) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            mode,
            isolation: IsolationMode::default(),
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    fn to_config(&self) -> SceneConfig {
        SceneConfig::new(SceneReference::new(self.path.clone()), self.mode)
            .with_isolation(self.isolation)
    }
}

/// Serializable description of a scene set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSetDefinition {
    /// Set name (for logging)
    pub name: String,
    /// Entries in load order
    #[serde(default)]
    pub scenes: Vec<SceneEntry>,
}

impl SceneSetDefinition {
    /// Create an empty definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenes: Vec::new(),
        }
    }

    /// Append an entry
    pub fn with_scene(mut self, entry: SceneEntry) -> Self {
        self.scenes.push(entry);
        self
    }

    /// Load a definition from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DefinitionError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    /// Parse a definition from RON text and validate it
    pub fn from_ron(contents: &str) -> Result<Self, DefinitionError> {
        let definition: Self = ron::from_str(contents)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Save the definition to a RON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DefinitionError> {
        let pretty = ron::ser::PrettyConfig::new()
            .struct_names(true)
            .enumerate_arrays(false);
        let contents = ron::ser::to_string_pretty(self, pretty)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check that every key is unique
    pub fn validate(&self) -> Result<(), DefinitionError> {
        self.to_configs().map(|_| ())
    }

    /// Build the runtime config map, preserving entry order
    pub fn to_configs(&self) -> Result<SceneConfigMap, DefinitionError> {
        let mut configs = SceneConfigMap::new();
        for entry in &self.scenes {
            configs.insert(entry.key.clone(), entry.to_config())?;
        }
        Ok(configs)
    }

    /// Number of singleton entries
    pub fn singleton_count(&self) -> usize {
        self.scenes.iter().filter(|e| e.mode == LoadMode::Singleton).count()
    }

    /// Keys of template entries, in order
    pub fn template_keys(&self) -> impl Iterator<Item = &str> {
        self.scenes
            .iter()
            .filter(|e| e.mode == LoadMode::Template)
            .map(|e| e.key.as_str())
    }
}
