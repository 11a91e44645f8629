// src/recipes/executor.rs
//
// =============================================================================
// REPROLAB: RECIPE EXECUTOR (v 0.1)
// =============================================================================
//
// The state machine for one step:
//
//   Pending -> Applied -> Recorded   (handler ran, tx committed, log appended)
//   Pending -> Failed                (tx rolled back, nothing appended)
//
// The log is only ever appended after the mutation commits, so a crash or a
// handler error can never leave a step without its mutation or a partial
// entry in the journal.

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};

use crate::database::WorkspaceDatabase;
use crate::error::{LabError, Result};
use crate::lab::LabRole;
use crate::layout::WorkspaceLayout;
use crate::recipes::registry::{StepContext, StepRegistry};
use crate::recipes::{Recipe, RecipeStep, OPEN_LAB_STEP};

pub struct RecipeExecutor;

impl RecipeExecutor {
    /// Execute one named step transactionally and record it.
    pub fn apply(
        registry: &StepRegistry,
        database: &mut WorkspaceDatabase,
        layout: &WorkspaceLayout,
        role: LabRole,
        step_type: &str,
        params: Map<String, Value>,
        author_id: Option<&str>,
    ) -> Result<Value> {
        if role != LabRole::Admin {
            return Err(LabError::Permission(
                "operations that modify the lab require the ADMIN role".into(),
            ));
        }

        let handler = registry.get(step_type)?;
        let step = RecipeStep::new(step_type, params.clone(), author_id);

        let tx = database.transaction()?;
        let ctx = StepContext {
            conn: &tx,
            workspace_root: layout.root(),
        };
        // A handler error drops `tx` here, rolling the mutation back. The
        // error propagates unchanged and no log entry is written.
        let outcome = handler(&ctx, &params, author_id)?;
        tx.commit()?;

        // Idempotent no-ops (define on an existing key, remove of a missing
        // id) leave the journal exactly as it was.
        if outcome.mutated {
            Self::record_step(layout, role, &step)?;
        }
        Ok(outcome.value)
    }

    /// Append one step to the workspace journal.
    ///
    /// Creates the log (and its implicit open_lab seed entry) on the first
    /// step ever recorded for this workspace.
    fn record_step(layout: &WorkspaceLayout, role: LabRole, step: &RecipeStep) -> Result<()> {
        let recipe_path = layout.current_recipe_path();
        if let Some(parent) = recipe_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut recipe = Self::read_recipe_file(&recipe_path)?;

        if recipe.steps.is_empty() {
            let mut params = Map::new();
            params.insert(
                "workspace_root".into(),
                json!(layout.root().to_string_lossy()),
            );
            params.insert("role".into(), json!(role.to_string()));
            recipe
                .steps
                .push(RecipeStep::new(OPEN_LAB_STEP, params, None));
        }

        recipe.steps.push(step.clone());
        recipe.updated_at = chrono::Utc::now();

        let pretty = serde_json::to_string_pretty(&recipe)?;
        fs::write(&recipe_path, pretty)?;
        log::debug!(
            "Recorded step '{}' ({} total) in {:?}",
            step.step_type,
            recipe.steps.len(),
            recipe_path
        );
        Ok(())
    }

    /// Load the workspace's own recipe. An absent file yields an empty
    /// recipe, not an error.
    pub fn load_recipe(layout: &WorkspaceLayout) -> Result<Recipe> {
        Self::read_recipe_file(&layout.current_recipe_path())
    }

    /// Load a recipe from an explicit path (used by replay).
    pub fn load_recipe_from(path: &Path) -> Result<Recipe> {
        Self::read_recipe_file(path)
    }

    fn read_recipe_file(path: &Path) -> Result<Recipe> {
        if !path.exists() {
            return Ok(Recipe::default());
        }
        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Recipe::default());
        }
        serde_json::from_str(&raw)
            .map_err(|e| LabError::Recipe(format!("failed to parse recipe at {path:?}: {e}")))
    }
}
