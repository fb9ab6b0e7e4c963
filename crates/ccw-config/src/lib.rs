// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Layered configuration for the ccw stream engine
//!
//! Configuration is resolved as JSON so layers can be merged without knowing
//! their fields. Precedence, lowest first: built-in defaults, system file,
//! user file, file given with `--config`, `CCW_*` environment variables.
//! The merged document is then deserialized into [`EngineConfig`].

pub mod env;
pub mod error;
pub mod loader;
pub mod merge;
pub mod paths;

pub use error::{ConfigError, ConfigResult};
pub use paths::Paths;

use ccw_domain_types::ExecutionMode;
use serde::{Deserialize, Serialize};
use serde_json::Value as J;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Where a configuration layer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Defaults,
    System,
    User,
    CliConfig,
    Env,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClassifierConfig {
    /// Number of distinct lines memoized; 0 disables the cache
    pub cache_capacity: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StoreConfig {
    pub change_channel_capacity: usize,
    pub default_tool: String,
    pub default_mode: ExecutionMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            change_channel_capacity: 256,
            default_tool: "cli".to_string(),
            default_mode: ExecutionMode::Analysis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IngestConfig {
    pub resync_on_connect: bool,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

impl IngestConfig {
    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms))
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            resync_on_connect: true,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PanesConfig {
    pub count: usize,
}

impl Default for PanesConfig {
    fn default() -> Self {
        Self { count: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerConfig {
    pub base_url: String,
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3456".to_string(),
            ws_path: "/ws".to_string(),
        }
    }
}

/// Fully resolved engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub panes: PanesConfig,
    pub server: ServerConfig,
}

/// Outcome of a load: the config plus the layers that contributed to it
#[derive(Debug, Clone)]
pub struct Resolved {
    pub config: EngineConfig,
    pub layers: Vec<(Scope, Option<PathBuf>)>,
}

impl EngineConfig {
    /// Load from the standard locations plus an optional explicit file
    pub fn load(cli_config: Option<PathBuf>) -> ConfigResult<Resolved> {
        let mut paths = paths::discover_paths();
        paths.cli_config = cli_config;
        load_all(&paths, None)
    }

    /// Deserialize a merged JSON document, naming the offending key on failure
    pub fn from_json(json: serde_json::Value) -> ConfigResult<Self> {
        serde_path_to_error::deserialize(json).map_err(|err| ConfigError::Invalid {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        })
    }
}

/// Merge every layer in precedence order.
///
/// `env` substitutes a fixed variable set for the process environment.
pub fn load_all(paths: &Paths, env: Option<HashMap<String, String>>) -> ConfigResult<Resolved> {
    let mut json = serde_json::to_value(EngineConfig::default())?;
    let mut layers = vec![(Scope::Defaults, None)];

    let file_layers = [
        (Scope::System, Some(&paths.system)),
        (Scope::User, Some(&paths.user)),
        (Scope::CliConfig, paths.cli_config.as_ref()),
    ];

    for (scope, path) in file_layers {
        let Some(path) = path else { continue };
        // An explicitly requested file must exist; the standard locations are optional
        if !path.exists() && scope != Scope::CliConfig {
            continue;
        }
        let layer = loader::read_layer_from_file(path)?;
        debug!(?scope, path = %path.display(), "merging configuration layer");
        merge::merge_two_json(&mut json, layer);
        layers.push((scope, Some(path.clone())));
    }

    let env_layer = env::env_overlay(env)?;
    if env_layer.as_object().is_some_and(|m| !m.is_empty()) {
        merge::merge_two_json(&mut json, env_layer);
        layers.push((Scope::Env, None));
    }

    Ok(Resolved {
        config: EngineConfig::from_json(json)?,
        layers,
    })
}
