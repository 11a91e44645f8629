// src/recipes/transpiler.rs
//
// =============================================================================
// REPROLAB: RECIPE TRANSPILER (v 0.1)
// =============================================================================
//
// Pure export of a Recipe to a standalone Rust program that opens a lab at
// the recorded root/role and replays the same calls. Human-readable
// reproducibility artifact; this engine never executes the output itself.

use crate::recipes::{Recipe, OPEN_LAB_STEP};

pub struct RecipeTranspiler;

impl RecipeTranspiler {
    pub fn to_script(recipe: &Recipe) -> String {
        let mut lines = vec![
            "// Reproducible ReproLab recipe".to_string(),
            format!("// Generated: {}", recipe.updated_at.to_rfc3339()),
            format!("// Recipe version: {}", recipe.version),
            String::new(),
            "use std::path::Path;".to_string(),
            "use reprolab::{Lab, LabRole};".to_string(),
            String::new(),
            "fn main() -> reprolab::Result<()> {".to_string(),
        ];

        // The open_lab seed entry carries the root and role to reopen with.
        let open = recipe.steps.iter().find(|s| s.step_type == OPEN_LAB_STEP);
        let (root, role) = match open {
            Some(step) => (
                step.params
                    .get("workspace_root")
                    .and_then(|v| v.as_str())
                    .unwrap_or(".")
                    .to_string(),
                step.params
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("ADMIN")
                    .to_string(),
            ),
            None => (".".to_string(), "ADMIN".to_string()),
        };
        let role_expr = if role == "VIEWER" {
            "LabRole::Viewer"
        } else {
            "LabRole::Admin"
        };
        lines.push(format!(
            "    let mut lab = Lab::open(Some(Path::new({root:?})), None, None, None, {role_expr})?;"
        ));

        for step in &recipe.steps {
            if step.step_type == OPEN_LAB_STEP {
                continue;
            }
            let params_json =
                serde_json::to_string(&step.params).unwrap_or_else(|_| "{}".to_string());
            lines.push(String::new());
            lines.push(format!("    // {}", step.step_type));

            let verb = step.step_type.split('_').next().unwrap_or("");
            if matches!(verb, "define" | "modify" | "remove") || step.step_type == "modify_config"
            {
                lines.push(format!(
                    "    lab.execute_step({:?}, serde_json::from_str(r#\"{}\"#)?, None)?;",
                    step.step_type, params_json
                ));
            } else {
                lines.push(format!("    // Unknown step type: {}", step.step_type));
                lines.push(format!(
                    "    // lab.execute_step({:?}, serde_json::from_str(r#\"{}\"#)?, None)?;",
                    step.step_type, params_json
                ));
            }
        }

        lines.push(String::new());
        lines.push("    Ok(())".to_string());
        lines.push("}".to_string());
        lines.join("\n")
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::RecipeStep;
    use serde_json::json;

    fn params(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        v.as_object().expect("object").clone()
    }

    #[test]
    fn script_opens_at_recorded_root_and_replays_steps() {
        let mut recipe = Recipe::default();
        recipe.steps.push(RecipeStep::new(
            OPEN_LAB_STEP,
            params(json!({"workspace_root": "/data/ws", "role": "ADMIN"})),
            None,
        ));
        recipe.steps.push(RecipeStep::new(
            "define_project",
            params(json!({"name": "Alpha"})),
            None,
        ));

        let script = RecipeTranspiler::to_script(&recipe);
        assert!(script.contains("Lab::open(Some(Path::new(\"/data/ws\")"));
        assert!(script.contains("LabRole::Admin"));
        assert!(script.contains("lab.execute_step(\"define_project\""));
        assert!(script.contains("Alpha"));
    }

    #[test]
    fn unknown_steps_become_comments() {
        let mut recipe = Recipe::default();
        recipe
            .steps
            .push(RecipeStep::new("frobnicate_widget", params(json!({})), None));

        let script = RecipeTranspiler::to_script(&recipe);
        assert!(script.contains("// Unknown step type: frobnicate_widget"));
        assert!(!script.contains("\n    lab.execute_step(\"frobnicate_widget\""));
    }
}
