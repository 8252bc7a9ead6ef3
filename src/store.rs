use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::artifact::{Artifact, BranchRef};
use crate::digest::compute_sha256;
use crate::errors::StoreError;

const LATEST_POINTER: &str = "LATEST";

/// Bounded backoff for transient store IO. The store is typically a CI
/// artifact volume or network mount, so a couple of retries is enough.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Filesystem-backed artifact store. Artifacts are immutable files under a
/// per-branch directory; a mutable `LATEST` pointer file names the current
/// baseline and is rewritten atomically on publish, so fetch never scans
/// history on the happy path.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    retry: RetryPolicy,
}

impl ArtifactStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn branch_dir(&self, branch: &BranchRef) -> PathBuf {
        self.root.join(branch.slug())
    }

    /// The most recently published artifact for `branch`, or
    /// `StoreError::NotFound` before the first publish.
    pub fn fetch_latest(&self, branch: &BranchRef) -> Result<Artifact, StoreError> {
        let dir = self.branch_dir(branch);
        if !dir.is_dir() {
            return Err(StoreError::NotFound {
                branch: branch.as_str().to_string(),
            });
        }

        let file_name = match self.read_pointer(&dir)? {
            Some(name) => name,
            None => match self.scan_for_latest(&dir)? {
                Some(name) => {
                    warn!(branch = %branch, "Latest pointer missing; recovered by scan");
                    name
                }
                None => {
                    return Err(StoreError::NotFound {
                        branch: branch.as_str().to_string(),
                    });
                }
            },
        };

        let path = dir.join(&file_name);
        self.verify_digest(&path)?;
        load_artifact(&path)
    }

    /// Upload `artifact` and move the branch's latest pointer to it. The
    /// artifact file lands via temp-write + rename, and the pointer is
    /// swapped the same way, so a concurrent fetch sees the old baseline or
    /// the new one, never a partial upload.
    pub fn publish(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let dir = self.branch_dir(&artifact.branch);
        let file_name = artifact.file_name();

        self.with_retries("publish", || {
            fs::create_dir_all(&dir)?;

            let final_path = dir.join(&file_name);
            let temp_path = dir.join(format!(".{file_name}.tmp-{}", std::process::id()));
            let json = serde_json::to_vec_pretty(artifact)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            fs::write(&temp_path, &json)?;
            fs::rename(&temp_path, &final_path)?;

            let digest = compute_sha256(&final_path)
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
            fs::write(dir.join(format!("{file_name}.sha256")), digest)?;

            let pointer_tmp = dir.join(format!(".{LATEST_POINTER}.tmp-{}", std::process::id()));
            fs::write(&pointer_tmp, &file_name)?;
            fs::rename(&pointer_tmp, dir.join(LATEST_POINTER))?;
            Ok(())
        })?;

        debug!(
            branch = %artifact.branch,
            file = %file_name,
            "Artifact published"
        );
        Ok(())
    }

    fn read_pointer(&self, dir: &Path) -> Result<Option<String>, StoreError> {
        let pointer = dir.join(LATEST_POINTER);
        if !pointer.is_file() {
            return Ok(None);
        }
        let name = self.with_retries("fetch", || fs::read_to_string(&pointer))?;
        let name = name.trim().to_string();
        if name.is_empty() { Ok(None) } else { Ok(Some(name)) }
    }

    /// Recovery path for an interrupted publish: pick the newest artifact
    /// by (created_at, sequence), ties resolved to the higher run number.
    fn scan_for_latest(&self, dir: &Path) -> Result<Option<String>, StoreError> {
        let entries = self.with_retries("fetch", || {
            let mut names = Vec::new();
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".json") && !name.starts_with('.') {
                    names.push(name);
                }
            }
            Ok(names)
        })?;

        let mut best: Option<(chrono::DateTime<chrono::Utc>, u64, String)> = None;
        for name in entries {
            let Ok(artifact) = Artifact::load(&dir.join(&name)) else {
                continue;
            };
            let candidate = (artifact.created_at, artifact.sequence, name);
            if best
                .as_ref()
                .map(|b| (candidate.0, candidate.1) > (b.0, b.1))
                .unwrap_or(true)
            {
                best = Some(candidate);
            }
        }
        Ok(best.map(|(_, _, name)| name))
    }

    fn verify_digest(&self, path: &Path) -> Result<(), StoreError> {
        let sidecar = PathBuf::from(format!("{}.sha256", path.display()));
        if !sidecar.is_file() {
            return Ok(());
        }
        let recorded = fs::read_to_string(&sidecar).unwrap_or_default();
        let recorded = recorded.split_whitespace().next().unwrap_or("").to_string();
        if recorded.is_empty() {
            return Ok(());
        }
        let actual = compute_sha256(path).map_err(|err| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        if actual != recorded {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("digest mismatch: recorded {recorded}, actual {actual}"),
            });
        }
        Ok(())
    }

    fn with_retries<T>(
        &self,
        op: &'static str,
        mut action: impl FnMut() -> io::Result<T>,
    ) -> Result<T, StoreError> {
        let mut backoff = self.retry.backoff;
        let mut last_err = None;
        for attempt in 1..=self.retry.attempts {
            match action() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(op, attempt, %err, "Store operation failed");
                    last_err = Some(err);
                    if attempt < self.retry.attempts {
                        std::thread::sleep(backoff);
                        backoff *= 2;
                    }
                }
            }
        }
        Err(StoreError::Transient {
            op,
            attempts: self.retry.attempts,
            source: last_err
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no attempts made")),
        })
    }
}

fn load_artifact(path: &Path) -> Result<Artifact, StoreError> {
    Artifact::load(path).map_err(|err| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
