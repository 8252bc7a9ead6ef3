use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the artifact store. `NotFound` is recoverable
/// (first run for a branch proceeds with an empty baseline); `Transient`
/// has already been retried by the time the caller sees it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no published artifact for branch '{branch}'")]
    NotFound { branch: String },
    #[error("artifact store {op} failed after {attempts} attempt(s): {source}")]
    Transient {
        op: &'static str,
        attempts: u32,
        #[source]
        source: io::Error,
    },
    #[error("malformed artifact at {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// The only error class that aborts the pipeline outright. Everything else
/// is accumulated into the run outcome as an incident.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("suite {path:?} is invalid: {reason}")]
    InvalidSuite { path: PathBuf, reason: String },
    #[error("cache root {path:?} is unusable: {source}")]
    CacheRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
