// src/recipes/handlers.rs
//
// =============================================================================
// REPROLAB: STEP HANDLERS (v 0.1)
// =============================================================================
//
// One generic CRUD handler factory, instantiated per entity descriptor:
//
//   define_<entity>  idempotent by natural key: an existing row with the
//                    same key is returned unchanged, never duplicated, and
//                    no journal entry is produced for the no-op.
//   modify_<entity>  requires "id"; missing row is a not-found error; only
//                    fields present in params are applied.
//   remove_<entity>  requires "id"; a missing row is success (idempotent).
//
// Plus the two specialized steps: open_lab (no-op on execution; the executor
// writes the seed entry itself) and modify_config (read-merge-write-reload
// of config.yaml).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::config;
use crate::entities::{self, EntityDescriptor};
use crate::error::{LabError, Result};
use crate::recipes::registry::{StepContext, StepOutcome, StepRegistry};
use crate::recipes::{MODIFY_CONFIG_STEP, OPEN_LAB_STEP};

/// Build the full step registry: CRUD triplet per known entity type plus the
/// specialized handlers.
pub fn build_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();

    for descriptor in entities::DESCRIPTORS {
        register_crud(&mut registry, descriptor);
    }

    registry.register(
        OPEN_LAB_STEP,
        Box::new(|_ctx, _params, _author| {
            // The lab is already open when this runs; the step only exists as
            // the implicit seed entry the executor writes itself.
            Ok(StepOutcome::unchanged(Value::Null))
        }),
    );

    registry.register(
        MODIFY_CONFIG_STEP,
        Box::new(|ctx: &StepContext<'_>, params, _author| {
            let updates: BTreeMap<String, Value> =
                params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let effective = config::write_config(ctx.workspace_root, &updates)?;
            Ok(StepOutcome::changed(serde_json::to_value(&effective)?))
        }),
    );

    registry
}

fn register_crud(registry: &mut StepRegistry, descriptor: &'static EntityDescriptor) {
    registry.register(
        format!("define_{}", descriptor.entity),
        Box::new(move |ctx, params, _author| define_entity(ctx, descriptor, params)),
    );
    registry.register(
        format!("modify_{}", descriptor.entity),
        Box::new(move |ctx, params, _author| modify_entity(ctx, descriptor, params)),
    );
    registry.register(
        format!("remove_{}", descriptor.entity),
        Box::new(move |ctx, params, _author| remove_entity(ctx, descriptor, params)),
    );
}

fn define_entity(
    ctx: &StepContext<'_>,
    descriptor: &EntityDescriptor,
    params: &Map<String, Value>,
) -> Result<StepOutcome> {
    if let Some(key) = params.get(descriptor.natural_key).and_then(Value::as_str) {
        if let Some(existing) = entities::find_by_natural_key(ctx.conn, descriptor, key)? {
            log::debug!(
                "define_{}: '{}' exists (id={}), returning existing row",
                descriptor.entity,
                key,
                existing.id
            );
            return Ok(StepOutcome::unchanged(existing.into_value(descriptor)));
        }
    }
    let row = entities::insert(ctx.conn, descriptor, params)?;
    Ok(StepOutcome::changed(row.into_value(descriptor)))
}

fn modify_entity(
    ctx: &StepContext<'_>,
    descriptor: &EntityDescriptor,
    params: &Map<String, Value>,
) -> Result<StepOutcome> {
    let id = require_id(descriptor, params, "modify")?;
    let row = entities::update(ctx.conn, descriptor, id, params)?;
    Ok(StepOutcome::changed(row.into_value(descriptor)))
}

fn remove_entity(
    ctx: &StepContext<'_>,
    descriptor: &EntityDescriptor,
    params: &Map<String, Value>,
) -> Result<StepOutcome> {
    let id = require_id(descriptor, params, "remove")?;
    // Idempotent: deleting a row that is already gone is still success, and
    // only an actual deletion is worth a journal entry.
    let deleted = entities::delete(ctx.conn, descriptor, id)?;
    Ok(StepOutcome {
        value: Value::Bool(true),
        mutated: deleted,
    })
}

fn require_id(
    descriptor: &EntityDescriptor,
    params: &Map<String, Value>,
    verb: &str,
) -> Result<i64> {
    params
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            LabError::Recipe(format!(
                "{verb}_{} requires an 'id' in params",
                descriptor.entity
            ))
        })
}
