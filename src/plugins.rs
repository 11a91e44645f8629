// src/plugins.rs
//
// =============================================================================
// REPROLAB: PLUGIN SYSTEM (v 0.1)
// =============================================================================
//
// Host-wide plugin catalog + per-Lab registry.
//
// A plugin is installed once per process (the analogue of a packaging entry
// point) and only becomes active in a workspace when its name appears in
// that workspace's `enabled_plugins` allow-list. Registration hooks run
// against an opened Lab; a failing plugin is logged and skipped so the
// workspace stays usable without it.

use std::sync::{Arc, OnceLock, RwLock};

use crate::error::Result;
use crate::lab::Lab;

/// Contract every extension implements. `register` must be idempotent: the
/// runtime may call it again after a config change re-enables the plugin.
pub trait LabPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn register(&self, lab: &mut Lab) -> Result<()>;
}

// -----------------------------------------------------------------------------
// Host-wide catalog
// -----------------------------------------------------------------------------

static HOST_CATALOG: OnceLock<RwLock<Vec<Arc<dyn LabPlugin>>>> = OnceLock::new();

fn host_catalog() -> &'static RwLock<Vec<Arc<dyn LabPlugin>>> {
    HOST_CATALOG.get_or_init(|| RwLock::new(Vec::new()))
}

/// Make a plugin discoverable process-wide. Installing does not enable it
/// anywhere; workspaces opt in via their config allow-list.
pub fn install_plugin(plugin: Arc<dyn LabPlugin>) {
    let mut catalog = host_catalog().write().unwrap_or_else(|e| e.into_inner());
    if catalog.iter().any(|p| p.name() == plugin.name()) {
        log::warn!("Plugin '{}' installed twice; replacing.", plugin.name());
        catalog.retain(|p| p.name() != plugin.name());
    }
    catalog.push(plugin);
}

fn installed_plugins() -> Vec<Arc<dyn LabPlugin>> {
    host_catalog()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

// -----------------------------------------------------------------------------
// Per-Lab registry
// -----------------------------------------------------------------------------

/// The subset of installed plugins enabled for one workspace.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn LabPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Re-resolve the allow-list against the host catalog. Names with no
    /// installed plugin are logged and skipped.
    pub fn discover(&mut self, enabled_list: &[String]) {
        self.plugins.clear();
        let installed = installed_plugins();

        for name in enabled_list {
            match installed.iter().find(|p| p.name() == name) {
                Some(plugin) => {
                    log::info!("Loaded plugin: {}", name);
                    self.plugins.push(Arc::clone(plugin));
                }
                None => {
                    log::warn!("Enabled plugin '{}' is not installed; skipping.", name);
                }
            }
        }
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn LabPlugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Snapshot used by the runtime so registration can borrow the Lab
    /// mutably while iterating.
    pub fn snapshot(&self) -> Vec<Arc<dyn LabPlugin>> {
        self.plugins.clone()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Runtime
// -----------------------------------------------------------------------------

pub struct PluginRuntime;

impl PluginRuntime {
    /// Run every enabled plugin's registration hook against the Lab.
    /// Per-plugin failures are logged and swallowed; the others still load.
    pub fn initialize_plugins(lab: &mut Lab) {
        for plugin in lab.plugin_registry().snapshot() {
            if let Err(e) = plugin.register(lab) {
                log::error!("Failed to register plugin {}: {}", plugin.name(), e);
            }
        }
    }
}
