use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::Value;

#[derive(Debug, Clone, Serialize)]
struct PresetSuite {
    version: u32,
    budget: BTreeMap<String, Value>,
    thresholds: BTreeMap<String, Value>,
    cases: Vec<CaseEntry>,
}

#[derive(Debug, Clone, Serialize)]
struct CaseEntry {
    name: String,
    command: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    budget: Option<BTreeMap<String, Value>>,
}

pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let preset = match name {
        "quick" => quick_preset(),
        "nightly" => nightly_preset(),
        other => anyhow::bail!("Unknown preset '{other}'"),
    };

    let rendered = serde_yaml::to_string(&preset)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write preset suite: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

/// Smoke-level suite for pull requests: few rounds, tight budgets.
fn quick_preset() -> PresetSuite {
    PresetSuite {
        version: 1,
        budget: budget(1, 3, 10.0, 30.0),
        thresholds: thresholds(15.0, 15.0),
        cases: vec![
            case("build", "./scripts/bench_build.sh", &[], None),
            case("startup", "./target/release/app", &["--version"], None),
        ],
    }
}

/// Tracked-branch suite: more rounds for tighter confidence intervals.
fn nightly_preset() -> PresetSuite {
    PresetSuite {
        version: 1,
        budget: budget(3, 20, 120.0, 300.0),
        thresholds: thresholds(10.0, 10.0),
        cases: vec![
            case("build", "./scripts/bench_build.sh", &[], None),
            case(
                "parse_corpus",
                "./target/release/app",
                &["parse", "corpus/"],
                Some(budget(5, 30, 300.0, 600.0)),
            ),
            case("startup", "./target/release/app", &["--version"], None),
        ],
    }
}

fn case(
    name: &str,
    command: &str,
    args: &[&str],
    budget: Option<BTreeMap<String, Value>>,
) -> CaseEntry {
    CaseEntry {
        name: name.into(),
        command: command.into(),
        args: args.iter().map(|a| a.to_string()).collect(),
        budget,
    }
}

fn budget(
    min_rounds: u64,
    max_rounds: u64,
    max_seconds: f64,
    timeout_seconds: f64,
) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    map.insert("min_rounds".into(), Value::from(min_rounds));
    map.insert("max_rounds".into(), Value::from(max_rounds));
    map.insert("max_seconds".into(), Value::from(max_seconds));
    map.insert("timeout_seconds".into(), Value::from(timeout_seconds));
    map
}

fn thresholds(regression_pct: f64, improvement_pct: f64) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    map.insert("regression_pct".into(), Value::from(regression_pct));
    map.insert("improvement_pct".into(), Value::from(improvement_pct));
    map
}
