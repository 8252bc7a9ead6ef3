use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// A logical line of development ("develop", "release/1.4", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchRef(String);

impl BranchRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form used for per-branch store directories.
    pub fn slug(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }
}

impl std::fmt::Display for BranchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Ok,
    Error,
    Timeout,
}

impl CaseStatus {
    pub fn is_ok(self) -> bool {
        self == CaseStatus::Ok
    }
}

/// One row per benchmark case. Timing statistics cover completed rounds
/// only, so a timed-out case with zero finished rounds carries no numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub name: String,
    pub unit: String,
    pub status: CaseStatus,
    pub rounds: u32,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub stddev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An immutable, timestamped bundle of benchmark results for one
/// branch/commit. Published artifacts are superseded, never mutated.
///
/// Readers must tolerate fields added by newer writers, which is why none
/// of these types opt into `deny_unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub branch: BranchRef,
    pub commit: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sequence: u64,
    pub results: Vec<ResultRecord>,
}

fn default_schema_version() -> u32 {
    ARTIFACT_SCHEMA_VERSION
}

impl Artifact {
    pub fn new(
        branch: BranchRef,
        commit: impl Into<String>,
        sequence: u64,
        results: Vec<ResultRecord>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for record in &results {
            if !seen.insert(record.name.as_str()) {
                bail!("duplicate case name '{}' in artifact", record.name);
            }
        }
        Ok(Self {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            branch,
            commit: commit.into(),
            created_at: Utc::now(),
            sequence,
            results,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact file: {}", path.display()))?;
        let artifact: Artifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact JSON: {}", path.display()))?;
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create artifact file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write artifact JSON: {}", path.display()))?;
        Ok(())
    }

    pub fn record(&self, name: &str) -> Option<&ResultRecord> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Store file name: sortable timestamp, run number, short commit.
    pub fn file_name(&self) -> String {
        let stamp = self.created_at.format("%Y%m%dT%H%M%S%3fZ");
        let short = self.commit.chars().take(12).collect::<String>();
        format!("{stamp}-{:06}-{short}.json", self.sequence)
    }
}
