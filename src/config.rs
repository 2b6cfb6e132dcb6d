//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`SCENESETS_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use serde::{Serialize, Deserialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use sceneset_core::SceneHostConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scene-set configuration
    #[serde(default)]
    pub scenes: ScenesConfig,
    /// Scene host configuration
    #[serde(default)]
    pub host: HostConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`SCENESETS_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        // Optional local overrides
        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // Environment variables override everything
        // SCENESETS_HOST__LOAD_DELAY_MS=50 -> host.load_delay_ms = 50
        figment = figment.merge(Env::prefixed("SCENESETS_").split("__"));

        figment.extract().map_err(ConfigError::from)
    }
}

/// Scene-set configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenesConfig {
    /// Path to the RON scene-set definition
    pub definition: String,
    /// How many instances of each template the demo loads
    pub instances_per_template: u32,
}

impl Default for ScenesConfig {
    fn default() -> Self {
        Self {
            definition: "scenes/demo.ron".to_string(),
            instances_per_template: 2,
        }
    }
}

/// Scene host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Simulated load latency in milliseconds
    #[serde(default)]
    pub load_delay_ms: u64,
    /// Simulated unload latency in milliseconds
    #[serde(default)]
    pub unload_delay_ms: u64,
    /// Loadable paths (empty = accept any path)
    #[serde(default)]
    pub catalog: Vec<String>,
}

impl HostConfig {
    /// Convert to the scene host's settings
    pub fn to_host_config(&self) -> SceneHostConfig {
        let catalog = if self.catalog.is_empty() {
            None
        } else {
            Some(self.catalog.iter().cloned().collect::<HashSet<_>>())
        };
        SceneHostConfig {
            load_delay: Duration::from_millis(self.load_delay_ms),
            unload_delay: Duration::from_millis(self.unload_delay_ms),
            catalog,
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}
