// src/recipes/mod.rs
//
// =============================================================================
// REPROLAB: RECIPE SCHEMAS (v 0.1)
// =============================================================================
//
// The recipe is the append-only journal of every mutating operation applied
// to a workspace. Steps are immutable once appended; corrections are new
// steps. A workspace can be rebuilt from its recipe alone.
//
// On-disk shape ({root}/recipes/current.json, pretty-printed):
//   { "steps": [ { step_id, step_type, params, author_id, timestamp } ],
//     "updated_at": ISO-8601 }
//
// The first step, when present, is always the implicit "open_lab" record.

pub mod executor;
pub mod handlers;
pub mod registry;
pub mod transpiler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const OPEN_LAB_STEP: &str = "open_lab";
pub const MODIFY_CONFIG_STEP: &str = "modify_config";

/// A single reproducible operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeStep {
    pub step_id: String,
    /// verb_noun, e.g. "define_project".
    pub step_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl RecipeStep {
    pub fn new(step_type: &str, params: Map<String, Value>, author_id: Option<&str>) -> Self {
        Self {
            step_id: Uuid::new_v4().to_string(),
            step_type: step_type.to_string(),
            params,
            author_id: author_id.map(String::from),
            timestamp: Utc::now(),
        }
    }
}

/// The full mutation history of a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default = "default_recipe_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_recipe_version() -> String {
    "1.0.0".to_string()
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            version: default_recipe_version(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            steps: Vec::new(),
            metadata: Map::new(),
        }
    }
}
