use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};

use crate::compare::Thresholds;

/// Benchmark suite definition, loaded from YAML. The workloads themselves
/// are external commands; the suite only names them and sets the budget
/// they run under.
#[derive(Debug, Deserialize)]
pub struct Suite {
    pub version: u32,
    #[serde(default)]
    pub budget: BudgetSpec,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub gate_regressions: bool,
    #[serde(default)]
    pub fixtures: Vec<FixtureSpec>,
    pub cases: Vec<CaseSpec>,
}

impl Suite {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file: {}", path.display()))?;
        let suite: Suite = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse suite YAML: {}", path.display()))?;
        Ok(suite)
    }

    /// Expand case templates into concrete cases. A case with an `inputs`
    /// glob becomes one case per matching file, named `<case>/<stem>`.
    pub fn expand_cases(&self) -> Result<Vec<ResolvedCase>> {
        let mut resolved = Vec::with_capacity(self.cases.len());
        for case in &self.cases {
            let budget = case.budget.clone().unwrap_or_else(|| self.budget.clone());
            match &case.inputs {
                None => resolved.push(ResolvedCase {
                    name: case.name.clone(),
                    command: case.command.clone(),
                    args: case.args.clone(),
                    budget,
                }),
                Some(pattern) => {
                    let matches = glob(pattern)
                        .with_context(|| format!("Invalid glob pattern: {pattern}"))?;
                    let mut found = false;
                    for entry in matches {
                        let path = entry?;
                        if !path.is_file() {
                            continue;
                        }
                        found = true;
                        resolved.push(ResolvedCase {
                            name: input_case_name(&case.name, &path),
                            command: case.command.clone(),
                            args: substitute_input(&case.args, &path),
                            budget: budget.clone(),
                        });
                    }
                    if !found {
                        anyhow::bail!("No inputs matched pattern: {pattern}");
                    }
                }
            }
        }
        Ok(resolved)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub inputs: Option<String>,
    #[serde(default)]
    pub budget: Option<BudgetSpec>,
}

/// Time/round budget for a case. The floor of one round holds even when
/// `max_seconds` is already spent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BudgetSpec {
    #[serde(default = "default_min_rounds")]
    pub min_rounds: u32,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_max_seconds")]
    pub max_seconds: f64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

fn default_min_rounds() -> u32 {
    1
}

fn default_max_rounds() -> u32 {
    10
}

fn default_max_seconds() -> f64 {
    30.0
}

fn default_timeout_seconds() -> f64 {
    60.0
}

impl Default for BudgetSpec {
    fn default() -> Self {
        Self {
            min_rounds: default_min_rounds(),
            max_rounds: default_max_rounds(),
            max_seconds: default_max_seconds(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Reusable state warmed through the result cache before the run. The
/// version field is part of the cache key, so bumping it invalidates the
/// cached copy.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureSpec {
    pub name: String,
    pub source: PathBuf,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedCase {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub budget: BudgetSpec,
}

fn input_case_name(base: &str, input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    format!("{base}/{stem}")
}

/// Replace `{input}` placeholders with the matched path; append the path
/// when no placeholder is present so the file always reaches the command.
fn substitute_input(args: &[String], input: &Path) -> Vec<String> {
    let input_str = input.to_string_lossy();
    let mut substituted = false;
    let mut out: Vec<String> = args
        .iter()
        .map(|arg| {
            if arg.contains("{input}") {
                substituted = true;
                arg.replace("{input}", &input_str)
            } else {
                arg.clone()
            }
        })
        .collect();
    if !substituted {
        out.push(input_str.to_string());
    }
    out
}
