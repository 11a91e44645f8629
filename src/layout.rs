// src/layout.rs
//
// =============================================================================
// REPROLAB: WORKSPACE LAYOUT (v 0.1)
// =============================================================================
//
// Canonical on-disk locations inside a workspace root:
//
//   {root}/config.yaml              configuration document
//   {root}/db/reprolab.sqlite3      embedded database
//   {root}/db/catalog.version       reference-data version marker
//   {root}/recipes/current.json     recipe log
//   {root}/storage/variants/        variant object storage
//   {root}/logs/                    workspace logs
//   {root}/tmp/                     scratch space
//
// `ensure_structure` is idempotent and tolerates concurrent callers: every
// mkdir accepts "already exists".

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_CONFIG_FILENAME;
use crate::error::{LabError, Result};

pub const DEFAULT_RECIPE_FILENAME: &str = "current.json";

// -----------------------------------------------------------------------------
// WorkspaceLayout
// -----------------------------------------------------------------------------

/// Stateless path computer for one workspace root.
///
/// The root must already be canonicalized by the open protocol; the layout
/// itself never resolves symlinks.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(DEFAULT_CONFIG_FILENAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("db").join("reprolab.sqlite3")
    }

    /// Plain-text mirror of the catalog version row, written after each sync
    /// so operators can check freshness without opening the database.
    pub fn catalog_version_path(&self) -> PathBuf {
        self.root.join("db").join("catalog.version")
    }

    pub fn recipes_dir(&self) -> PathBuf {
        self.root.join("recipes")
    }

    pub fn recipe_path(&self, name: &str) -> PathBuf {
        self.recipes_dir().join(name)
    }

    pub fn current_recipe_path(&self) -> PathBuf {
        self.recipe_path(DEFAULT_RECIPE_FILENAME)
    }

    pub fn variants_dir(&self) -> PathBuf {
        self.root.join("storage").join("variants")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Create the directory skeleton if missing.
    ///
    /// Must run before the database is opened, before any recipe step is
    /// executed, and before catalog sync.
    pub fn ensure_structure(&self) -> Result<()> {
        log::debug!("Ensuring workspace structure at {:?}", self.root);

        for dir in [
            self.db_path().parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone()),
            self.recipes_dir(),
            self.variants_dir(),
            self.logs_dir(),
            self.tmp_dir(),
        ] {
            // create_dir_all returns Ok for already-existing directories, so a
            // concurrent caller winning the race is not an error.
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ResultsLayout
// -----------------------------------------------------------------------------

/// The write-only results root.
#[derive(Debug, Clone)]
pub struct ResultsLayout {
    root: PathBuf,
}

impl ResultsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute a subdirectory path, rejecting anything that escapes the root.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let candidate = self.root.join(name);

        // Lexical traversal check: no component may climb out of the root.
        let mut depth: i32 = 0;
        for component in Path::new(name).components() {
            match component {
                std::path::Component::ParentDir => depth -= 1,
                std::path::Component::Normal(_) => depth += 1,
                std::path::Component::CurDir => {}
                _ => {
                    return Err(LabError::PathSecurity {
                        path: candidate.clone(),
                        root: self.root.clone(),
                    })
                }
            }
            if depth < 0 {
                return Err(LabError::PathSecurity {
                    path: candidate.clone(),
                    root: self.root.clone(),
                });
            }
        }
        Ok(candidate)
    }
}

// =============================================================================
// TESTS
// =============================================================================
