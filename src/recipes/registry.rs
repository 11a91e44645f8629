// src/recipes/registry.rs
//
// =============================================================================
// REPROLAB: STEP REGISTRY (v 0.1)
// =============================================================================
//
// Maps a step type string to its handler by exact match. Populated once at
// Lab construction (handlers::build_registry); the façade does a plain
// lookup instead of runtime introspection.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::error::{LabError, Result};

/// What a handler may touch: the open transaction and the workspace root.
/// Role gating happened before dispatch; handlers never re-check it.
pub struct StepContext<'a> {
    pub conn: &'a Connection,
    pub workspace_root: &'a Path,
}

/// Handler result plus whether state actually changed. Only mutating
/// outcomes are journaled: an idempotent define that found an existing row
/// returns it `unchanged`, and the log stays exactly as it was.
pub struct StepOutcome {
    pub value: Value,
    pub mutated: bool,
}

impl StepOutcome {
    pub fn changed(value: Value) -> Self {
        Self {
            value,
            mutated: true,
        }
    }

    pub fn unchanged(value: Value) -> Self {
        Self {
            value,
            mutated: false,
        }
    }
}

pub type StepHandler =
    Box<dyn Fn(&StepContext<'_>, &Map<String, Value>, Option<&str>) -> Result<StepOutcome> + Send>;

pub struct StepRegistry {
    handlers: HashMap<String, StepHandler>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, step_type: impl Into<String>, handler: StepHandler) {
        let step_type = step_type.into();
        if self.handlers.contains_key(&step_type) {
            log::warn!("Step type '{}' is already registered. Overwriting.", step_type);
        }
        self.handlers.insert(step_type, handler);
    }

    /// Exact-match lookup. Unknown step types are a programmer error.
    pub fn get(&self, step_type: &str) -> Result<&StepHandler> {
        self.handlers
            .get(step_type)
            .ok_or_else(|| LabError::UnknownStep(step_type.to_string()))
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.handlers.contains_key(step_type)
    }

    pub fn step_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
