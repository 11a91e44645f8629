// src/database.rs
//
// =============================================================================
// REPROLAB: WORKSPACE DATABASE (v 0.1)
// =============================================================================
//
// The persistence layer for one workspace.
//
// Architecture:
// - SQLite using the "Hybrid Relational" pattern: the natural key and
//   timestamps are columns, everything else is one JSON text column.
// - One connection, owned exclusively by one Lab instance. The LabCache
//   single-key invariant is what prevents two writers on the same file.
// - VIEWER roles get a read-only connection; schema init is skipped.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction};

use crate::entities;
use crate::error::Result;

pub struct WorkspaceDatabase {
    path: PathBuf,
    conn: Connection,
    read_only: bool,
}

impl WorkspaceDatabase {
    /// Open (and for read-write connections, initialize) the workspace
    /// database at `path`.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        log::debug!("Connecting to database at {:?} (read_only={})", path, read_only);

        let conn = if read_only {
            Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            Connection::open(&path)?
        };

        // Busy timeout absorbs short reader contention on shared filesystems.
        conn.busy_timeout(std::time::Duration::from_millis(10_000))?;

        if !read_only {
            // DELETE journal mode keeps the workspace a single portable file.
            // synchronous=NORMAL is safe enough given the recipe log doubles
            // as a recovery journal.
            conn.execute_batch(
                "PRAGMA journal_mode=DELETE;
                 PRAGMA synchronous=NORMAL;",
            )?;
        }

        let db = Self {
            path,
            conn,
            read_only,
        };
        if !read_only {
            db.init_schema()?;
        }
        Ok(db)
    }

    /// Create all entity tables plus the sys_metadata key-value table.
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sys_metadata (
                key   TEXT PRIMARY KEY,
                value TEXT
            );",
        )?;

        for descriptor in entities::DESCRIPTORS {
            self.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    name       TEXT,
                    attrs      TEXT NOT NULL DEFAULT '{{}}',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_name ON {table}(name);",
                table = descriptor.table
            ))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Direct connection access for read paths.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction. Commit is explicit; dropping the transaction
    /// rolls back, which is what makes failed handlers leave no trace.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}

// -----------------------------------------------------------------------------
// sys_metadata helpers
// -----------------------------------------------------------------------------
// Free functions over &Connection so they work both on the live connection
// and inside a transaction (Transaction derefs to Connection).

pub fn get_sys_metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM sys_metadata WHERE key = ?1", [key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(value)
}

pub fn set_sys_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sys_metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [key, value],
    )?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_metadata_round_trip_and_upsert() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let db = WorkspaceDatabase::open(tmp.path().join("db.sqlite3"), false).expect("open");

        assert_eq!(get_sys_metadata(db.conn(), "k").expect("get"), None);
        set_sys_metadata(db.conn(), "k", "v1").expect("set");
        set_sys_metadata(db.conn(), "k", "v2").expect("overwrite");
        assert_eq!(
            get_sys_metadata(db.conn(), "k").expect("get"),
            Some("v2".to_string())
        );
    }

    #[test]
    fn read_only_open_requires_existing_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("missing.sqlite3");
        assert!(WorkspaceDatabase::open(&path, true).is_err());

        // Once an admin created it, a viewer can attach.
        WorkspaceDatabase::open(&path, false).expect("create");
        let viewer = WorkspaceDatabase::open(&path, true).expect("read-only open");
        assert!(viewer.is_read_only());
    }
}
