// src/lab.rs
//
// =============================================================================
// REPROLAB: THE LAB FAÇADE (v 0.1)
// =============================================================================
//
// The central entry point. Wires configuration, layout, database, variant
// store, and plugins together for one workspace, and exposes the role-gated
// domain operations.
//
// Open protocol (each step a precondition for the next):
//   1. Resolve roots (explicit, or derived from base_root).
//   2. Canonicalize the workspace root, creating it if absent.
//   3. Bootstrap config.yaml if missing.
//   4. Load the effective config (defaults < file < env).
//   5. Fall back to config-recorded roots; results defaults to
//      {workspace}/results, input may stay unset.
//   6. Ensure the directory skeleton.
//   7. Open the database (read-only for VIEWER).
//   8. Discover and initialize enabled plugins.
//   9. ADMIN only: catalog sync, best-effort.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::CatalogManager;
use crate::config::{self, LabConfig};
use crate::database::WorkspaceDatabase;
use crate::error::{LabError, Result};
use crate::layout::{ResultsLayout, WorkspaceLayout};
use crate::plugins::{PluginRegistry, PluginRuntime};
use crate::recipes::executor::RecipeExecutor;
use crate::recipes::handlers;
use crate::recipes::registry::StepRegistry;
use crate::recipes::transpiler::RecipeTranspiler;
use crate::recipes::{Recipe, MODIFY_CONFIG_STEP, OPEN_LAB_STEP};
use crate::store::VariantStore;

// -----------------------------------------------------------------------------
// Roles
// -----------------------------------------------------------------------------

/// Supplied by the caller per request; never persisted by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabRole {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "VIEWER")]
    Viewer,
}

impl fmt::Display for LabRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabRole::Admin => write!(f, "ADMIN"),
            LabRole::Viewer => write!(f, "VIEWER"),
        }
    }
}

// -----------------------------------------------------------------------------
// Lab
// -----------------------------------------------------------------------------

pub struct Lab {
    config: LabConfig,
    layout: WorkspaceLayout,
    results: ResultsLayout,
    database: WorkspaceDatabase,
    store: VariantStore,
    input_root: Option<PathBuf>,
    role: LabRole,
    registry: StepRegistry,
    plugin_registry: PluginRegistry,
}

impl std::fmt::Debug for Lab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lab")
            .field("layout", &self.layout)
            .field("results", &self.results)
            .field("input_root", &self.input_root)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Lab {
    /// Open a lab workspace. Supports explicit roots or base_root
    /// derivation; bootstraps config.yaml when missing.
    ///
    /// Failure anywhere in root resolution, config load, layout creation, or
    /// database open is fatal: the workspace is not considered open.
    pub fn open(
        workspace_root: Option<&Path>,
        input_root: Option<&Path>,
        results_root: Option<&Path>,
        base_root: Option<&Path>,
        role: LabRole,
    ) -> Result<Lab> {
        // 1. Resolve roots
        let mut ws_root = workspace_root.map(Path::to_path_buf);
        let mut input_root = input_root.map(Path::to_path_buf);
        let mut results_root = results_root.map(Path::to_path_buf);

        if let Some(base) = base_root {
            let base = absolutize(base)?;
            ws_root.get_or_insert_with(|| base.join("workspace"));
            input_root.get_or_insert_with(|| base.join("input"));
            results_root.get_or_insert_with(|| base.join("results"));
        }

        let ws_root = ws_root.ok_or_else(|| {
            LabError::InvalidArguments("workspace_root or base_root is required".into())
        })?;

        log::debug!("Lab roots configuration:");
        log::debug!("  Workspace root: {:?}", ws_root);
        log::debug!("  Input root:     {:?}", input_root);
        log::debug!("  Results root:   {:?}", results_root);

        // 2. Canonicalize the workspace root, creating it if absent.
        if !ws_root.exists() {
            if role == LabRole::Viewer {
                // Whether a viewer may land on a missing workspace at all is
                // the calling layer's policy; here we only record it.
                log::warn!("VIEWER opening a workspace that does not exist yet: {:?}", ws_root);
            }
            log::info!("Creating new workspace directory at {:?}", ws_root);
            fs::create_dir_all(&ws_root)?;
        }
        let ws_root = fs::canonicalize(&ws_root)?;

        // 3. Bootstrap config if missing, seeding the supplied roots.
        config::create_default_config(&ws_root, input_root.as_deref(), results_root.as_deref())?;

        // 4. Load the effective config.
        let lab_config = config::load_config(&ws_root)?;

        // 5. Fall back to config-recorded roots.
        if input_root.is_none() {
            if let Some(recorded) = &lab_config.input_path {
                log::debug!("Restored input root from config: {}", recorded);
                input_root = Some(PathBuf::from(recorded));
            }
        }
        if results_root.is_none() {
            if let Some(recorded) = &lab_config.results_path {
                log::debug!("Restored results root from config: {}", recorded);
                results_root = Some(PathBuf::from(recorded));
            }
        }

        // 6. Layouts + directory skeleton.
        let layout = WorkspaceLayout::new(ws_root.clone());
        layout.ensure_structure()?;

        let results = match results_root {
            Some(path) => {
                fs::create_dir_all(&path)?;
                ResultsLayout::new(fs::canonicalize(&path)?)
            }
            None => {
                // Structural default: results live inside the workspace.
                let path = ws_root.join("results");
                fs::create_dir_all(&path)?;
                ResultsLayout::new(path)
            }
        };

        let input_root = match input_root {
            Some(path) => Some(absolutize(&path)?),
            None => None,
        };

        // 7. Database (read-only for viewers).
        let database = WorkspaceDatabase::open(layout.db_path(), role == LabRole::Viewer)?;

        // 8. Plugins: discovery is not role-gated, only mutation inside a
        // plugin's own hooks is.
        let mut plugin_registry = PluginRegistry::new();
        plugin_registry.discover(&lab_config.enabled_plugins);

        let store = VariantStore::new(layout.variants_dir());
        let mut lab = Lab {
            config: lab_config,
            layout,
            results,
            database,
            store,
            input_root,
            role,
            registry: handlers::build_registry(),
            plugin_registry,
        };
        PluginRuntime::initialize_plugins(&mut lab);

        // 9. Smart-eager catalog seeding, admins only. A failed sync must not
        // make the workspace unusable.
        if role == LabRole::Admin {
            if let Err(e) = lab.try_catalog_sync() {
                log::warn!("Catalog sync failed: {}", e);
            }
        }

        log::info!("Lab initialized at {:?} (role: {})", lab.layout.root(), lab.role);
        Ok(lab)
    }

    fn try_catalog_sync(&mut self) -> Result<()> {
        let cm = CatalogManager::new();
        if cm.should_sync(self.database.conn())? {
            cm.sync_all(self.database.conn())?;
            fs::write(self.layout.catalog_version_path(), cm.package_version())?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn results(&self) -> &ResultsLayout {
        &self.results
    }

    pub fn database(&self) -> &WorkspaceDatabase {
        &self.database
    }

    pub fn store(&self) -> &VariantStore {
        &self.store
    }

    pub fn input_root(&self) -> Option<&Path> {
        self.input_root.as_deref()
    }

    pub fn role(&self) -> LabRole {
        self.role
    }

    pub fn plugin_registry(&self) -> &PluginRegistry {
        &self.plugin_registry
    }

    pub fn step_types(&self) -> Vec<String> {
        self.registry.step_types()
    }

    // -------------------------------------------------------------------------
    // Recipe operations
    // -------------------------------------------------------------------------

    /// Execute a named recipe step and record it in the journal.
    /// Requires ADMIN; viewers get a permission error and the Lab stays
    /// valid for reads.
    pub fn execute_step(
        &mut self,
        step_type: &str,
        params: Map<String, Value>,
        author_id: Option<&str>,
    ) -> Result<Value> {
        RecipeExecutor::apply(
            &self.registry,
            &mut self.database,
            &self.layout,
            self.role,
            step_type,
            params,
            author_id,
        )
    }

    /// `define_<entity>`: create-or-return-existing by natural key.
    pub fn define(&mut self, entity: &str, params: Map<String, Value>) -> Result<Value> {
        self.execute_step(&format!("define_{entity}"), params, None)
    }

    /// `modify_<entity>`: patch the row with `id`.
    pub fn modify(&mut self, entity: &str, id: i64, mut params: Map<String, Value>) -> Result<Value> {
        params.insert("id".into(), Value::from(id));
        self.execute_step(&format!("modify_{entity}"), params, None)
    }

    /// `remove_<entity>`: idempotent delete by `id`.
    pub fn remove(&mut self, entity: &str, id: i64) -> Result<Value> {
        let mut params = Map::new();
        params.insert("id".into(), Value::from(id));
        self.execute_step(&format!("remove_{entity}"), params, None)
    }

    // Named wrappers for the most common entities.

    pub fn define_project(&mut self, params: Map<String, Value>) -> Result<Value> {
        self.define("project", params)
    }

    pub fn modify_project(&mut self, id: i64, params: Map<String, Value>) -> Result<Value> {
        self.modify("project", id, params)
    }

    pub fn remove_project(&mut self, id: i64) -> Result<Value> {
        self.remove("project", id)
    }

    pub fn define_sensor(&mut self, params: Map<String, Value>) -> Result<Value> {
        self.define("sensor", params)
    }

    pub fn modify_sensor(&mut self, id: i64, params: Map<String, Value>) -> Result<Value> {
        self.modify("sensor", id, params)
    }

    pub fn remove_sensor(&mut self, id: i64) -> Result<Value> {
        self.remove("sensor", id)
    }

    /// Update the configuration through the recipe (so the change is
    /// journaled), then refresh this Lab's own view of it.
    pub fn modify_config(&mut self, updates: BTreeMap<String, Value>) -> Result<Value> {
        let params: Map<String, Value> =
            updates.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let result = self.execute_step(MODIFY_CONFIG_STEP, params, None)?;

        self.config = config::load_config(self.layout.root())?;

        if updates.contains_key("enabled_plugins") {
            self.plugin_registry.discover(&self.config.enabled_plugins);
            PluginRuntime::initialize_plugins(self);
        }
        Ok(result)
    }

    /// Load this workspace's recipe. Absent log -> empty recipe.
    pub fn load_recipe(&self) -> Result<Recipe> {
        RecipeExecutor::load_recipe(&self.layout)
    }

    /// Re-execute a recorded recipe, step by step, through `execute_step`.
    /// Defaults to the workspace's own journal. Convergent: define is
    /// idempotent by name, remove by id.
    pub fn run_recipe(&mut self, recipe_path: Option<&Path>) -> Result<()> {
        if self.role != LabRole::Admin {
            return Err(LabError::Permission("only ADMINs can run recipes".into()));
        }

        let path = recipe_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.current_recipe_path());
        if !path.exists() {
            return Err(LabError::Recipe(format!("no recipe found at {path:?}")));
        }

        log::info!("Executing recipe from {:?}", path);
        let recipe = RecipeExecutor::load_recipe_from(&path)?;
        for step in recipe.steps {
            if step.step_type == OPEN_LAB_STEP {
                continue;
            }
            self.execute_step(&step.step_type, step.params, step.author_id.as_deref())?;
        }
        Ok(())
    }

    /// Export the journal as a standalone script.
    pub fn transpile_recipe(&self) -> Result<String> {
        Ok(RecipeTranspiler::to_script(&self.load_recipe()?))
    }

    /// Manual catalog sync. Unlike the best-effort sync during open, errors
    /// here propagate.
    pub fn sync_catalog(&mut self) -> Result<()> {
        if self.role != LabRole::Admin {
            return Err(LabError::Permission("catalog sync requires ADMIN".into()));
        }
        let cm = CatalogManager::new();
        cm.sync_all(self.database.conn())?;
        fs::write(self.layout.catalog_version_path(), cm.package_version())?;
        Ok(())
    }
}

/// Resolve to an absolute path without requiring existence (canonicalize
/// when possible, otherwise anchor at the current directory).
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        Ok(fs::canonicalize(path)?)
    } else if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
