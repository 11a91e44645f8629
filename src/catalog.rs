// src/catalog.rs
//
// =============================================================================
// REPROLAB: CATALOG MANAGER (v 0.1)
// =============================================================================
//
// Seeds normative reference data (units, sensor models, species) into a
// workspace database. "Smart-Eager" strategy: check the stored version,
// sync only when it differs from the bundled one.
//
// Upsert rule: insert if missing by natural key, NEVER overwrite an existing
// row. A workspace owner's edits to a catalog row survive every sync. The
// version marker is written only after all sets processed.

use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::database::{get_sys_metadata, set_sys_metadata};
use crate::entities::{self, EntityDescriptor};
use crate::error::{LabError, Result};

pub const CATALOG_VERSION_KEY: &str = "catalog_version";

// Reference data ships inside the binary. One JSON array per entity set.
const VERSION_TXT: &str = include_str!("resources/catalog/version.txt");
const UNITS_JSON: &str = include_str!("resources/catalog/units_of_measurement.json");
const OBSERVED_PROPERTIES_JSON: &str = include_str!("resources/catalog/observed_properties.json");
const SENSOR_MODELS_JSON: &str = include_str!("resources/catalog/sensor_models.json");
const TREE_SPECIES_JSON: &str = include_str!("resources/catalog/tree_species.json");

pub struct CatalogManager;

impl CatalogManager {
    pub fn new() -> Self {
        Self
    }

    /// Version string bundled with this build.
    pub fn package_version(&self) -> &'static str {
        VERSION_TXT.trim()
    }

    /// True when the stored version row is absent or differs from the
    /// package version. Presence/equality check, not an ordering.
    pub fn should_sync(&self, conn: &Connection) -> Result<bool> {
        let db_version = get_sys_metadata(conn, CATALOG_VERSION_KEY)?;
        Ok(versions_differ(
            db_version.as_deref(),
            self.package_version(),
        ))
    }

    /// Seed every reference-data set, then write the version marker.
    ///
    /// An error in any one set aborts the call before the marker update, so
    /// the next open retries. Rows inserted by earlier sets stay; re-running
    /// is safe because inserts are keyed on the natural key.
    pub fn sync_all(&self, conn: &Connection) -> Result<()> {
        let version = self.package_version();
        log::info!("Starting catalog sync (target version {})...", version);

        for (entity, raw) in [
            ("unit_of_measurement", UNITS_JSON),
            ("observed_property", OBSERVED_PROPERTIES_JSON),
            ("sensor_model", SENSOR_MODELS_JSON),
            ("tree_species", TREE_SPECIES_JSON),
        ] {
            let descriptor = entities::find_descriptor(entity)
                .ok_or_else(|| LabError::Recipe(format!("no descriptor for catalog set '{entity}'")))?;
            self.sync_set(conn, descriptor, raw)?;
        }

        set_sys_metadata(conn, CATALOG_VERSION_KEY, version)?;
        log::info!("Catalog sync completed.");
        Ok(())
    }

    fn sync_set(&self, conn: &Connection, descriptor: &EntityDescriptor, raw: &str) -> Result<()> {
        let items: Vec<Map<String, Value>> = serde_json::from_str(raw)?;

        let mut inserted = 0usize;
        for item in &items {
            let key = item
                .get(descriptor.natural_key)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    LabError::Recipe(format!(
                        "catalog entry for {} missing natural key '{}'",
                        descriptor.entity, descriptor.natural_key
                    ))
                })?;

            if entities::find_by_natural_key(conn, descriptor, key)?.is_none() {
                entities::insert(conn, descriptor, item)?;
                inserted += 1;
            }
        }
        log::debug!(
            "Catalog set {}: {} bundled, {} inserted",
            descriptor.entity,
            items.len(),
            inserted
        );
        Ok(())
    }
}

impl Default for CatalogManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure staleness check used by `should_sync`.
pub fn versions_differ(db_version: Option<&str>, package_version: &str) -> bool {
    match db_version {
        None => true,
        Some(v) => v != package_version,
    }
}

// =============================================================================
// TESTS
// =============================================================================
