// src/config.rs
//
// =============================================================================
// REPROLAB: WORKSPACE CONFIGURATION (v 0.1)
// =============================================================================
//
// The immutable per-workspace configuration document.
//
// Layered precedence (later wins):
//   built-in defaults  <  config.yaml on disk  <  REPROLAB_* environment vars
//
// "Updating" config never mutates in place: read the on-disk document,
// shallow-merge the requested fields, write it back, reload. Env overrides
// therefore still apply after every write.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LabError, Result};

pub const DEFAULT_CONFIG_FILENAME: &str = "config.yaml";

/// Prefix for environment overrides. `REPROLAB_INPUT_PATH` beats the
/// `input_path` key in config.yaml, which beats the built-in default.
pub const ENV_PREFIX: &str = "REPROLAB_";

// -----------------------------------------------------------------------------
// The Config Value
// -----------------------------------------------------------------------------

/// Immutable configuration for one workspace.
///
/// Unknown keys in the on-disk document are ignored; a syntactically invalid
/// document is a fatal configuration error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabConfig {
    #[serde(default = "default_version")]
    pub config_version: String,

    // Persisted roots (relative or absolute)
    #[serde(default)]
    pub input_path: Option<String>,
    #[serde(default)]
    pub results_path: Option<String>,

    /// Allow-list of enabled plugin names.
    #[serde(default)]
    pub enabled_plugins: Vec<String>,

    /// Plugin-specific configuration, namespaced by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            config_version: default_version(),
            input_path: None,
            results_path: None,
            enabled_plugins: Vec::new(),
            plugins: BTreeMap::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// Loading (defaults < file < env)
// -----------------------------------------------------------------------------

/// Load the effective configuration for a workspace root.
///
/// A missing document is not an error: defaults (plus env overrides) are
/// returned and `create_default_config` can materialize one later.
pub fn load_config(workspace_root: &Path) -> Result<LabConfig> {
    let config_path = workspace_root.join(DEFAULT_CONFIG_FILENAME);

    let file_config = if config_path.exists() {
        let raw = fs::read_to_string(&config_path)?;
        let parsed: LabConfig = serde_yaml::from_str(&raw)
            .map_err(|e| LabError::config(&config_path, format!("invalid YAML: {e}")))?;
        log::debug!("Loaded config from {:?}", config_path);
        parsed
    } else {
        log::debug!("No config found at {:?}, using defaults.", config_path);
        LabConfig::default()
    };

    let env_map: Vec<(String, String)> = env::vars()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect();

    Ok(apply_env_overrides(file_config, &env_map))
}

/// Pure field-level merge of environment overrides onto a loaded config.
///
/// Variable names are the fixed prefix plus the upper-cased field name
/// (`REPROLAB_RESULTS_PATH` -> `results_path`). `enabled_plugins` accepts a
/// comma-separated list. Variables matching no known field are ignored.
pub fn apply_env_overrides(mut config: LabConfig, env_map: &[(String, String)]) -> LabConfig {
    for (key, value) in env_map {
        let field = match key.strip_prefix(ENV_PREFIX) {
            Some(f) => f,
            None => continue,
        };
        match field {
            "CONFIG_VERSION" => config.config_version = value.clone(),
            "INPUT_PATH" => config.input_path = Some(value.clone()),
            "RESULTS_PATH" => config.results_path = Some(value.clone()),
            "ENABLED_PLUGINS" => {
                config.enabled_plugins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            other => {
                log::debug!("Ignoring unknown config override {}{}", ENV_PREFIX, other);
            }
        }
    }
    config
}

// -----------------------------------------------------------------------------
// Bootstrap
// -----------------------------------------------------------------------------

/// Bootstrap a new configuration document if one does not exist.
///
/// Idempotent: an existing document is left untouched, whatever it contains.
pub fn create_default_config(
    workspace_root: &Path,
    initial_input: Option<&Path>,
    initial_results: Option<&Path>,
) -> Result<PathBuf> {
    let config_path = workspace_root.join(DEFAULT_CONFIG_FILENAME);
    if config_path.exists() {
        return Ok(config_path);
    }

    let config = LabConfig {
        input_path: initial_input.map(|p| p.to_string_lossy().into_owned()),
        results_path: initial_results.map(|p| p.to_string_lossy().into_owned()),
        ..LabConfig::default()
    };

    log::info!("Bootstrapping default configuration at {:?}", config_path);
    let doc = serde_yaml::to_string(&config)
        .map_err(|e| LabError::config(&config_path, format!("serialize failed: {e}")))?;
    fs::write(&config_path, doc)?;

    Ok(config_path)
}

// -----------------------------------------------------------------------------
// Write (read-merge-write-reload)
// -----------------------------------------------------------------------------

/// Apply a shallow field update to the on-disk document and return the new
/// effective config.
///
/// Only keys present in `updates` change; the merged document is persisted and
/// then reloaded so env overrides keep their precedence.
pub fn write_config(workspace_root: &Path, updates: &BTreeMap<String, Value>) -> Result<LabConfig> {
    let config_path = workspace_root.join(DEFAULT_CONFIG_FILENAME);

    // Current on-disk state (not the env-merged view: env values must never
    // leak into the persisted document).
    let current: LabConfig = if config_path.exists() {
        let raw = fs::read_to_string(&config_path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| LabError::config(&config_path, format!("invalid YAML: {e}")))?
    } else {
        LabConfig::default()
    };

    // Shallow merge via the JSON object form.
    let mut doc = serde_json::to_value(&current)?;
    let map = doc
        .as_object_mut()
        .ok_or_else(|| LabError::config(&config_path, "config is not a mapping"))?;
    for (key, value) in updates {
        map.insert(key.clone(), value.clone());
    }

    let merged: LabConfig = serde_json::from_value(doc)
        .map_err(|e| LabError::config(&config_path, format!("invalid update: {e}")))?;

    let yaml = serde_yaml::to_string(&merged)
        .map_err(|e| LabError::config(&config_path, format!("serialize failed: {e}")))?;
    fs::write(&config_path, yaml)?;
    log::info!("Updated configuration at {:?}", config_path);

    load_config(workspace_root)
}

// =============================================================================
// TESTS
// =============================================================================
