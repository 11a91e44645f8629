// src/store.rs
//
// =============================================================================
// REPROLAB: VARIANT STORE (v 0.1)
// =============================================================================
//
// Write-once persistence for data variants under storage/variants/.
//
// Canonical structure (partition-style):
//   {variants_root}/project_id={P}/datastream_id={D}/{variant_name}.{ext}
//
// An existing variant is never silently replaced: reprocessing should use a
// new variant name, or pass `clobber` explicitly. Writes go through a temp
// file plus rename so a variant either exists completely or not at all, and
// every write returns a SHA-256 receipt.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{LabError, Result};

/// Proof of a completed variant write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantReceipt {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes_written: u64,
}

pub struct VariantStore {
    root: PathBuf,
}

impl VariantStore {
    pub fn new(variants_root: impl Into<PathBuf>) -> Self {
        Self {
            root: variants_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn variant_path(
        &self,
        project_id: i64,
        datastream_id: i64,
        variant_name: &str,
        extension: &str,
    ) -> PathBuf {
        self.root
            .join(format!("project_id={project_id}"))
            .join(format!("datastream_id={datastream_id}"))
            .join(format!("{variant_name}.{extension}"))
    }

    pub fn write_variant(
        &self,
        project_id: i64,
        datastream_id: i64,
        variant_name: &str,
        extension: &str,
        data: &[u8],
        clobber: bool,
    ) -> Result<VariantReceipt> {
        let final_path = self.variant_path(project_id, datastream_id, variant_name, extension);
        let dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir)?;

        if final_path.exists() && !clobber {
            return Err(LabError::VariantExists(final_path));
        }

        let mut hasher = Sha256::new();
        hasher.update(data);
        let sha256 = hex::encode(hasher.finalize());

        // Temp-then-rename: readers never observe a half-written variant.
        let tmp_path = dir.join(format!(".{variant_name}.{extension}.tmp"));
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &final_path)?;

        log::info!(
            "Wrote variant {:?} ({} bytes, sha256={})",
            final_path,
            data.len(),
            &sha256[..12]
        );

        Ok(VariantReceipt {
            path: final_path,
            sha256,
            bytes_written: data.len() as u64,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
