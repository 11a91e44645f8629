// src/entities.rs
//
// =============================================================================
// REPROLAB: ENTITY DESCRIPTORS & GENERIC CRUD (v 0.1)
// =============================================================================
//
// The engine does not define a relational schema per domain entity. Every
// entity type shares one hybrid row shape:
//
//   id          generated primary key
//   name        the natural-key value (a column, because every idempotency
//               and catalog lookup filters on it)
//   attrs       all remaining fields, as one JSON object
//
// An EntityDescriptor names the table and which params field is the natural
// key. The CRUD handler factory in recipes/handlers.rs is parameterized over
// these descriptors; nothing else in the crate knows entity names.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::error::{LabError, Result};

// -----------------------------------------------------------------------------
// Descriptors
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity name as used in step types (`define_<entity>`).
    pub entity: &'static str,
    /// Backing table name.
    pub table: &'static str,
    /// Params field used for idempotency checks (usually `name`).
    pub natural_key: &'static str,
}

pub const DESCRIPTORS: &[EntityDescriptor] = &[
    EntityDescriptor { entity: "project", table: "projects", natural_key: "name" },
    EntityDescriptor { entity: "experiment", table: "experiments", natural_key: "name" },
    EntityDescriptor { entity: "experimental_unit", table: "experimental_units", natural_key: "name" },
    EntityDescriptor { entity: "treatment", table: "treatments", natural_key: "name" },
    EntityDescriptor { entity: "treatment_application", table: "treatment_applications", natural_key: "name" },
    EntityDescriptor { entity: "run", table: "runs", natural_key: "name" },
    EntityDescriptor { entity: "sensor_deployment", table: "sensor_deployments", natural_key: "name" },
    EntityDescriptor { entity: "location", table: "locations", natural_key: "name" },
    EntityDescriptor { entity: "thing", table: "things", natural_key: "name" },
    EntityDescriptor { entity: "tree_species", table: "tree_species", natural_key: "name" },
    EntityDescriptor { entity: "tree", table: "trees", natural_key: "name" },
    EntityDescriptor { entity: "cable", table: "cables", natural_key: "name" },
    EntityDescriptor { entity: "sensor_model", table: "sensor_models", natural_key: "name" },
    EntityDescriptor { entity: "sensor", table: "sensors", natural_key: "name" },
    EntityDescriptor { entity: "observed_property", table: "observed_properties", natural_key: "name" },
    EntityDescriptor { entity: "unit_of_measurement", table: "units_of_measurement", natural_key: "unit" },
    EntityDescriptor { entity: "datastream", table: "datastreams", natural_key: "name" },
    EntityDescriptor { entity: "datastream_channel", table: "datastream_channels", natural_key: "name" },
    EntityDescriptor { entity: "data_variant", table: "data_variants", natural_key: "name" },
];

pub fn find_descriptor(entity: &str) -> Option<&'static EntityDescriptor> {
    DESCRIPTORS.iter().find(|d| d.entity == entity)
}

// -----------------------------------------------------------------------------
// Row shape
// -----------------------------------------------------------------------------

/// A fully materialized, detached entity row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub id: i64,
    pub name: Option<String>,
    pub attrs: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRow {
    /// Flatten into one JSON object: attrs plus `id` and the natural-key
    /// field under its descriptor name.
    pub fn into_value(self, descriptor: &EntityDescriptor) -> Value {
        let mut map = self.attrs;
        map.insert("id".into(), Value::from(self.id));
        if let Some(name) = self.name {
            map.insert(descriptor.natural_key.into(), Value::String(name));
        }
        map.insert("created_at".into(), Value::String(self.created_at));
        map.insert("updated_at".into(), Value::String(self.updated_at));
        Value::Object(map)
    }
}

fn row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, Option<String>, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn materialize(raw: (i64, Option<String>, String, String, String)) -> Result<EntityRow> {
    let (id, name, attrs_json, created_at, updated_at) = raw;
    let attrs: Map<String, Value> = serde_json::from_str(&attrs_json)?;
    Ok(EntityRow {
        id,
        name,
        attrs,
        created_at,
        updated_at,
    })
}

/// Split `params` into (natural key value, attribute bag). Non-string natural
/// keys are stored via their JSON rendering.
fn split_params(descriptor: &EntityDescriptor, params: &Map<String, Value>) -> (Option<String>, Map<String, Value>) {
    let mut attrs = params.clone();
    attrs.remove("id");
    let name = attrs.remove(descriptor.natural_key).map(|v| match v {
        Value::String(s) => s,
        other => other.to_string(),
    });
    (name, attrs)
}

// -----------------------------------------------------------------------------
// CRUD primitives (run inside the executor's transaction)
// -----------------------------------------------------------------------------

pub fn find_by_natural_key(
    conn: &Connection,
    descriptor: &EntityDescriptor,
    key: &str,
) -> Result<Option<EntityRow>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT id, name, attrs, created_at, updated_at FROM {} WHERE name = ?1",
                descriptor.table
            ),
            [key],
            row_from_sql,
        )
        .optional()?;
    raw.map(materialize).transpose()
}

pub fn get(conn: &Connection, descriptor: &EntityDescriptor, id: i64) -> Result<Option<EntityRow>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT id, name, attrs, created_at, updated_at FROM {} WHERE id = ?1",
                descriptor.table
            ),
            [id],
            row_from_sql,
        )
        .optional()?;
    raw.map(materialize).transpose()
}

pub fn insert(
    conn: &Connection,
    descriptor: &EntityDescriptor,
    params: &Map<String, Value>,
) -> Result<EntityRow> {
    let (name, attrs) = split_params(descriptor, params);
    let now = Utc::now().to_rfc3339();
    let attrs_json = serde_json::to_string(&attrs)?;

    conn.execute(
        &format!(
            "INSERT INTO {} (name, attrs, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            descriptor.table
        ),
        params![name, attrs_json, now, now],
    )?;
    let id = conn.last_insert_rowid();

    log::info!("Created {} id={} name={:?}", descriptor.entity, id, name);
    Ok(EntityRow {
        id,
        name,
        attrs,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Apply only the fields present in `params` to the row with `id`.
pub fn update(
    conn: &Connection,
    descriptor: &EntityDescriptor,
    id: i64,
    params: &Map<String, Value>,
) -> Result<EntityRow> {
    let mut row = get(conn, descriptor, id)?
        .ok_or_else(|| LabError::not_found(descriptor.entity, id))?;

    let (name, patch) = split_params(descriptor, params);
    if name.is_some() {
        row.name = name;
    }
    for (key, value) in patch {
        row.attrs.insert(key, value);
    }
    row.updated_at = Utc::now().to_rfc3339();

    let attrs_json = serde_json::to_string(&row.attrs)?;
    conn.execute(
        &format!(
            "UPDATE {} SET name = ?1, attrs = ?2, updated_at = ?3 WHERE id = ?4",
            descriptor.table
        ),
        params![row.name, attrs_json, row.updated_at, id],
    )?;

    log::debug!("Updated {} id={}", descriptor.entity, id);
    Ok(row)
}

/// Returns whether a row was actually removed. Callers treat a missing row
/// as success (idempotent delete).
pub fn delete(conn: &Connection, descriptor: &EntityDescriptor, id: i64) -> Result<bool> {
    let affected = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", descriptor.table),
        [id],
    )?;
    if affected > 0 {
        log::info!("Deleted {} id={}", descriptor.entity, id);
    }
    Ok(affected > 0)
}

pub fn count(conn: &Connection, descriptor: &EntityDescriptor) -> Result<i64> {
    let n = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", descriptor.table),
        [],
        |r| r.get(0),
    )?;
    Ok(n)
}

// =============================================================================
// TESTS
// =============================================================================
