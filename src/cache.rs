// src/cache.rs
//
// =============================================================================
// REPROLAB: LAB CACHE (v 0.1)
// =============================================================================
//
// Process-wide, bounded, TTL-based cache of Lab instances keyed by
// (workspace identity, role).
//
// One coarse lock guards every state transition. Opens are rare compared to
// request traffic, so correctness wins over throughput here. The at-most-one
// Lab per (workspace, role) invariant is what makes single-writer recipe
// logging safe; nothing at the database layer enforces it.
//
// Staleness signal: the config document's mtime. A newer document, a
// document that appeared, or a document that vanished all force a rebuild.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use uuid::Uuid;

use crate::config::DEFAULT_CONFIG_FILENAME;
use crate::error::{LabError, Result};
use crate::lab::{Lab, LabRole};

pub const DEFAULT_MAX_SIZE: usize = 8;
pub const DEFAULT_TTL: Duration = Duration::from_secs(900);

// -----------------------------------------------------------------------------
// Identity -> paths
// -----------------------------------------------------------------------------

/// Isolated roots for one workspace identity:
/// `{data_root}/workspaces/{workspace_id}/{workspace,input,results}`.
#[derive(Debug, Clone)]
pub struct LabPaths {
    pub workspace_root: PathBuf,
    pub input_root: PathBuf,
    pub results_root: PathBuf,
}

pub fn resolve_workspace_paths(data_root: &Path, workspace_id: Uuid) -> Result<LabPaths> {
    let safe_root = if data_root.exists() {
        fs::canonicalize(data_root)?
    } else {
        data_root.to_path_buf()
    };

    let base = safe_root.join("workspaces").join(workspace_id.to_string());
    if !base.starts_with(&safe_root) {
        return Err(LabError::PathSecurity {
            path: base,
            root: safe_root,
        });
    }

    Ok(LabPaths {
        workspace_root: base.join("workspace"),
        input_root: base.join("input"),
        results_root: base.join("results"),
    })
}

pub fn ensure_workspace_paths(paths: &LabPaths) -> Result<()> {
    fs::create_dir_all(&paths.workspace_root)?;
    fs::create_dir_all(&paths.input_root)?;
    fs::create_dir_all(&paths.results_root)?;
    Ok(())
}

// -----------------------------------------------------------------------------
// Cache
// -----------------------------------------------------------------------------

struct LabEntry {
    lab: Arc<Mutex<Lab>>,
    last_used: Instant,
    config_mtime: Option<SystemTime>,
}

type CacheKey = (Uuid, LabRole);

/// Created once at process start and handed to whatever layer resolves
/// workspaces. Not a global: tests construct isolated instances.
pub struct LabCache {
    data_root: PathBuf,
    max_size: usize,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, LabEntry>>,
}

impl LabCache {
    pub fn new(data_root: impl Into<PathBuf>, max_size: usize, ttl: Duration) -> Self {
        Self {
            data_root: data_root.into(),
            max_size,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults(data_root: impl Into<PathBuf>) -> Self {
        Self::new(data_root, DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }

    /// Return the cached Lab for (workspace, role), constructing one when
    /// missing or stale. Concurrent callers for the same key get the same
    /// underlying instance.
    pub fn get(&self, workspace_id: Uuid, role: LabRole) -> Result<Arc<Mutex<Lab>>> {
        let now = Instant::now();
        let key = (workspace_id, role);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        Self::evict_expired(&mut entries, now, self.ttl);

        if let Some(entry) = entries.get_mut(&key) {
            if !self.config_changed(entry.config_mtime, workspace_id)? {
                entry.last_used = now;
                return Ok(Arc::clone(&entry.lab));
            }
            log::info!(
                "Config drift detected for workspace {}; rebuilding Lab.",
                workspace_id
            );
        }

        // Miss, or a stale entry that must be replaced.
        Self::evict_key(&mut entries, &key);

        let (lab, config_mtime) = self.create_lab(workspace_id, role)?;
        let handle = Arc::new(Mutex::new(lab));
        entries.insert(
            key,
            LabEntry {
                lab: Arc::clone(&handle),
                last_used: now,
                config_mtime,
            },
        );
        Self::evict_lru_if_needed(&mut entries, self.max_size);
        Ok(handle)
    }

    /// Evict every role's entry for a workspace. Used after out-of-band
    /// config edits so the next `get` rebuilds.
    pub fn invalidate(&self, workspace_id: Uuid) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<CacheKey> = entries
            .keys()
            .filter(|(id, _)| *id == workspace_id)
            .copied()
            .collect();
        for key in keys {
            Self::evict_key(&mut entries, &key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn create_lab(
        &self,
        workspace_id: Uuid,
        role: LabRole,
    ) -> Result<(Lab, Option<SystemTime>)> {
        let paths = resolve_workspace_paths(&self.data_root, workspace_id)?;
        ensure_workspace_paths(&paths)?;
        let lab = Lab::open(
            Some(&paths.workspace_root),
            Some(&paths.input_root),
            Some(&paths.results_root),
            None,
            role,
        )?;
        let config_mtime = config_mtime(&paths.workspace_root);
        Ok((lab, config_mtime))
    }

    fn config_changed(&self, recorded: Option<SystemTime>, workspace_id: Uuid) -> Result<bool> {
        let paths = resolve_workspace_paths(&self.data_root, workspace_id)?;
        let current = config_mtime(&paths.workspace_root);
        Ok(fingerprint_stale(recorded, current))
    }

    fn evict_expired(entries: &mut HashMap<CacheKey, LabEntry>, now: Instant, ttl: Duration) {
        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_used) > ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            log::debug!("Evicting idle Lab for workspace {} ({})", key.0, key.1);
            Self::evict_key(entries, &key);
        }
    }

    fn evict_lru_if_needed(entries: &mut HashMap<CacheKey, LabEntry>, max_size: usize) {
        while entries.len() > max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| *key);
            match oldest {
                Some(key) => Self::evict_key(entries, &key),
                None => break,
            }
        }
    }

    fn evict_key(entries: &mut HashMap<CacheKey, LabEntry>, key: &CacheKey) {
        if let Some(entry) = entries.remove(key) {
            // The SQLite connection closes when the last Arc drops. A caller
            // still holding the handle keeps it alive until then; the cache
            // just guarantees it will never hand that instance out again.
            drop(entry);
        }
    }
}

fn config_mtime(workspace_root: &Path) -> Option<SystemTime> {
    fs::metadata(workspace_root.join(DEFAULT_CONFIG_FILENAME))
        .and_then(|m| m.modified())
        .ok()
}

/// Pure staleness rule for the config fingerprint.
///
/// - document vanished but we had a fingerprint -> stale
/// - document present but we had none -> stale (first real config appeared)
/// - both present -> stale only if the document is newer
pub fn fingerprint_stale(recorded: Option<SystemTime>, current: Option<SystemTime>) -> bool {
    match (recorded, current) {
        (Some(_), None) => true,
        (None, Some(_)) => true,
        (None, None) => false,
        (Some(recorded), Some(current)) => current > recorded,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fingerprint_staleness_rules() {
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_secs(10);

        assert!(fingerprint_stale(Some(t0), None));
        assert!(fingerprint_stale(None, Some(t0)));
        assert!(!fingerprint_stale(None, None));
        assert!(fingerprint_stale(Some(t0), Some(t1)));
        assert!(!fingerprint_stale(Some(t1), Some(t1)));
        assert!(!fingerprint_stale(Some(t1), Some(t0)));
    }

    #[test]
    fn workspace_paths_are_isolated_per_identity() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let paths_a = resolve_workspace_paths(tmp.path(), a).expect("resolve a");
        let paths_b = resolve_workspace_paths(tmp.path(), b).expect("resolve b");

        assert_ne!(paths_a.workspace_root, paths_b.workspace_root);
        assert!(paths_a
            .workspace_root
            .ends_with(format!("workspaces/{a}/workspace")));
    }
}
