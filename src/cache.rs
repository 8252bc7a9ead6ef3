use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::digest::sha256_hex;
use crate::errors::FatalError;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Build a cache key that encodes tool version identity, so a toolchain
/// upgrade can never silently reuse entries written by an older one.
pub fn cache_key(kind: &str, name: &str, version: &str) -> String {
    format!(
        "{kind}/{name}@{version}+tool-{}",
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheManifest {
    pub key: String,
    pub tool_version: String,
    pub created_at: DateTime<Utc>,
}

/// Content-addressed directory shared across pipeline runs. Each key owns
/// one slot; writes stage into a sibling and swap in by rename, so readers
/// observe either the previous entry or the complete new one.
#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FatalError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| FatalError::CacheRoot {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot(&self, key: &str) -> PathBuf {
        self.root.join(sha256_hex(key))
    }

    /// Filesystem location for `key`, or `None` on a cold start.
    pub fn get(&self, key: &str) -> Option<PathBuf> {
        let slot = self.slot(key);
        let data = slot.join("data");
        if slot.join("manifest.json").is_file() && data.exists() {
            Some(data)
        } else {
            None
        }
    }

    /// Materialize `source` (file or directory tree) under `key`,
    /// overwriting any prior entry. Returns the cached data path.
    pub fn put(&self, key: &str, source: &Path) -> Result<PathBuf> {
        let slot = self.slot(key);
        let staging = self.scratch_path("staging");

        fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create cache staging: {}", staging.display()))?;
        if let Err(err) = self.populate_staging(key, source, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        // Rename cannot replace a non-empty directory, so any existing
        // slot is displaced out of the way first. Racing writers each
        // displace whatever they find and retry; the last rename to land
        // owns the slot, and no reader ever sees a half-written entry.
        let mut swapped = false;
        for _ in 0..16 {
            if slot.exists() {
                let evicted = self.scratch_path("evict");
                if fs::rename(&slot, &evicted).is_ok() {
                    let _ = fs::remove_dir_all(&evicted);
                }
            }
            if fs::rename(&staging, &slot).is_ok() {
                swapped = true;
                break;
            }
        }
        if !swapped {
            let _ = fs::remove_dir_all(&staging);
            anyhow::bail!(
                "Failed to move cache entry into place: {}",
                slot.display()
            );
        }

        debug!(key, slot = %slot.display(), "Cache entry written");
        Ok(slot.join("data"))
    }

    fn populate_staging(&self, key: &str, source: &Path, staging: &Path) -> Result<()> {
        copy_tree(source, &staging.join("data"))?;
        let manifest = CacheManifest {
            key: key.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
        };
        let file = fs::File::create(staging.join("manifest.json"))
            .context("Failed to create cache manifest")?;
        serde_json::to_writer_pretty(file, &manifest).context("Failed to write cache manifest")?;
        Ok(())
    }

    fn scratch_path(&self, prefix: &str) -> PathBuf {
        let nonce = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{prefix}-{}-{nonce}", std::process::id()))
    }

    pub fn entries(&self) -> Result<Vec<CacheManifest>> {
        let mut manifests = Vec::new();
        let read = match fs::read_dir(&self.root) {
            Ok(read) => read,
            Err(_) => return Ok(manifests),
        };
        for entry in read.flatten() {
            // Scratch directories are dot-prefixed and not entries.
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let manifest_path = entry.path().join("manifest.json");
            if !manifest_path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&manifest_path)?;
            match serde_json::from_str::<CacheManifest>(&content) {
                Ok(manifest) => manifests.push(manifest),
                Err(err) => debug!(path = %manifest_path.display(), %err, "Skipping unreadable manifest"),
            }
        }
        manifests.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(manifests)
    }

    pub fn clear(&self) -> Result<()> {
        fs::remove_dir_all(&self.root)
            .with_context(|| format!("Failed to clear cache root: {}", self.root.display()))?;
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to recreate cache root: {}", self.root.display()))?;
        Ok(())
    }
}

fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    if source.is_dir() {
        fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
        for entry in fs::read_dir(source)
            .with_context(|| format!("Failed to read directory: {}", source.display()))?
        {
            let entry = entry?;
            copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::copy(source, dest).with_context(|| {
            format!(
                "Failed to copy '{}' to '{}'",
                source.display(),
                dest.display()
            )
        })?;
    }
    Ok(())
}
