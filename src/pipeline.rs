use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::artifact::{Artifact, BranchRef};
use crate::cache::{ResultCache, cache_key};
use crate::compare::{ComparisonReport, Thresholds, compare};
use crate::errors::FatalError;
use crate::observability::MetricsCollector;
use crate::runner::{RunContext, run_cases};
use crate::store::ArtifactStore;
use crate::suite::Suite;
use crate::validation::validate_suite;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelinePhase {
    Init,
    Fetching,
    WarmingCache,
    Running,
    Comparing,
    Publishing,
    Done,
    Failed,
}

impl PipelinePhase {
    pub fn label(self) -> &'static str {
        match self {
            PipelinePhase::Init => "init",
            PipelinePhase::Fetching => "fetching",
            PipelinePhase::WarmingCache => "warming-cache",
            PipelinePhase::Running => "running",
            PipelinePhase::Comparing => "comparing",
            PipelinePhase::Publishing => "publishing",
            PipelinePhase::Done => "done",
            PipelinePhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStatus {
    Success,
    SuccessWithRegressions,
    PartialFailure,
    FatalFailure,
}

impl PipelineStatus {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStatus::Success => "success",
            PipelineStatus::SuccessWithRegressions => "success-with-regressions",
            PipelineStatus::PartialFailure => "partial-failure",
            PipelineStatus::FatalFailure => "fatal-failure",
        }
    }

    /// A regression alone is not a hard gate unless explicitly configured.
    pub fn exit_code(self, gate_regressions: bool) -> i32 {
        match self {
            PipelineStatus::Success => 0,
            PipelineStatus::SuccessWithRegressions => {
                if gate_regressions {
                    2
                } else {
                    0
                }
            }
            PipelineStatus::PartialFailure => 3,
            PipelineStatus::FatalFailure => 1,
        }
    }
}

/// A non-fatal failure, kept as data rather than raised. The final report
/// carries the full list so a degraded run still tells the whole story.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub phase: PipelinePhase,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub branch: BranchRef,
    pub published: bool,
    pub gate_regressions: bool,
    pub incidents: Vec<Incident>,
    pub report: ComparisonReport,
    pub artifact: Artifact,
}

#[derive(Debug)]
pub struct PipelineOptions {
    pub suite_path: PathBuf,
    pub branch: BranchRef,
    pub commit: String,
    pub sequence: u64,
    pub store_root: PathBuf,
    pub cache_root: PathBuf,
    pub persist: bool,
    pub workdir: Option<PathBuf>,
    pub regression_threshold: Option<f64>,
    pub improvement_threshold: Option<f64>,
    pub gate_override: Option<bool>,
}

/// Sequences fetch → warm cache → run → compare → publish. Per-case
/// failures, fetch degradation, and publish trouble accumulate as
/// incidents; only the fatal configuration class aborts the run.
pub struct PipelineController {
    options: PipelineOptions,
    metrics: MetricsCollector,
    phase: PipelinePhase,
    incidents: Vec<Incident>,
}

impl PipelineController {
    pub fn new(options: PipelineOptions, metrics: MetricsCollector) -> Self {
        Self {
            options,
            metrics,
            phase: PipelinePhase::Init,
            incidents: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<PipelineOutcome> {
        let total_start = Instant::now();
        self.metrics.reset();

        let (suite, cases) = match self.load_suite() {
            Ok(loaded) => loaded,
            Err(fatal) => {
                self.phase = PipelinePhase::Failed;
                return Err(fatal.into());
            }
        };
        let thresholds = Thresholds {
            regression_pct: self
                .options
                .regression_threshold
                .unwrap_or(suite.thresholds.regression_pct),
            improvement_pct: self
                .options
                .improvement_threshold
                .unwrap_or(suite.thresholds.improvement_pct),
        };
        let gate_regressions = self.options.gate_override.unwrap_or(suite.gate_regressions);

        let store = ArtifactStore::open(&self.options.store_root);

        self.advance(PipelinePhase::Fetching);
        let baseline = self.fetch_baseline(&store);

        self.advance(PipelinePhase::WarmingCache);
        let fixture_env = match self.warm_cache(&suite) {
            Ok(env) => env,
            Err(fatal) => {
                self.phase = PipelinePhase::Failed;
                return Err(fatal.into());
            }
        };

        self.advance(PipelinePhase::Running);
        let artifact = {
            let _timer = self.metrics.start_phase(PipelinePhase::Running.label());
            let ctx = RunContext {
                branch: self.options.branch.clone(),
                commit: self.options.commit.clone(),
                sequence: self.options.sequence,
                env: fixture_env,
                workdir: self.options.workdir.clone(),
            };
            run_cases(&cases, &ctx, &self.metrics)?
        };
        for record in &artifact.results {
            if !record.status.is_ok() {
                self.incident(format!(
                    "case '{}' ended with status {:?}{}",
                    record.name,
                    record.status,
                    record
                        .detail
                        .as_deref()
                        .map(|d| format!(": {d}"))
                        .unwrap_or_default()
                ));
            }
        }

        // Comparison is not gated on a clean run; a degraded report still
        // shows which cases regressed or newly failed.
        self.advance(PipelinePhase::Comparing);
        let report = {
            let _timer = self.metrics.start_phase(PipelinePhase::Comparing.label());
            compare(baseline.as_ref(), &artifact, &thresholds)
        };
        self.metrics.record_regressions(report.summary.regressed as u64);

        self.advance(PipelinePhase::Publishing);
        let published = self.publish(&store, &artifact);

        self.advance(PipelinePhase::Done);
        let status = if !self.incidents.is_empty() {
            PipelineStatus::PartialFailure
        } else if report.has_regressions() {
            PipelineStatus::SuccessWithRegressions
        } else {
            PipelineStatus::Success
        };
        self.metrics.record_total_duration(total_start.elapsed());

        info!(
            status = ?status,
            incidents = self.incidents.len(),
            regressed = report.summary.regressed,
            "Pipeline finished"
        );

        Ok(PipelineOutcome {
            status,
            branch: self.options.branch.clone(),
            published,
            gate_regressions,
            incidents: self.incidents,
            report,
            artifact,
        })
    }

    fn load_suite(&mut self) -> Result<(Suite, Vec<crate::suite::ResolvedCase>), FatalError> {
        let _timer = self.metrics.start_phase(PipelinePhase::Init.label());
        let path = self.options.suite_path.clone();
        let suite = Suite::load(&path).map_err(|err| FatalError::InvalidSuite {
            path: path.clone(),
            reason: format!("{err:#}"),
        })?;

        let validation = validate_suite(&suite);
        for warning in &validation.warnings {
            warn!(suite = %path.display(), "{warning}");
        }
        if !validation.is_ok() {
            return Err(FatalError::InvalidSuite {
                path,
                reason: validation.errors.join("; "),
            });
        }

        let cases = suite.expand_cases().map_err(|err| FatalError::InvalidSuite {
            path,
            reason: format!("{err:#}"),
        })?;
        Ok((suite, cases))
    }

    fn fetch_baseline(&mut self, store: &ArtifactStore) -> Option<Artifact> {
        let _timer = self.metrics.start_phase(PipelinePhase::Fetching.label());
        match store.fetch_latest(&self.options.branch) {
            Ok(artifact) => {
                info!(
                    branch = %self.options.branch,
                    commit = artifact.commit.as_str(),
                    sequence = artifact.sequence,
                    "Baseline fetched"
                );
                Some(artifact)
            }
            Err(err) if err.is_not_found() => {
                info!(
                    branch = %self.options.branch,
                    "No baseline published yet; first run for this branch"
                );
                None
            }
            Err(err) => {
                self.incident(format!("baseline fetch degraded: {err}"));
                None
            }
        }
    }

    fn warm_cache(&mut self, suite: &Suite) -> Result<Vec<(String, String)>, FatalError> {
        let _timer = self.metrics.start_phase(PipelinePhase::WarmingCache.label());
        let mut env = Vec::new();
        if suite.fixtures.is_empty() {
            return Ok(env);
        }

        let cache = ResultCache::open(&self.options.cache_root)?;
        for fixture in &suite.fixtures {
            let key = cache_key("fixture", &fixture.name, &fixture.version);
            let location = match cache.get(&key) {
                Some(path) => {
                    info!(fixture = fixture.name.as_str(), "Cache hit");
                    Some(path)
                }
                None => match cache.put(&key, &fixture.source) {
                    Ok(path) => {
                        info!(fixture = fixture.name.as_str(), "Cache warmed");
                        Some(path)
                    }
                    Err(err) => {
                        self.incident(format!(
                            "fixture '{}' could not be cached: {err:#}",
                            fixture.name
                        ));
                        None
                    }
                },
            };
            if let Some(path) = location {
                env.push((
                    fixture_env_name(&fixture.name),
                    path.to_string_lossy().to_string(),
                ));
            }
        }
        Ok(env)
    }

    fn publish(&mut self, store: &ArtifactStore, artifact: &Artifact) -> bool {
        let _timer = self.metrics.start_phase(PipelinePhase::Publishing.label());
        if !self.options.persist {
            info!("Persist flag off; skipping publish");
            return false;
        }
        match store.publish(artifact) {
            Ok(()) => {
                info!(branch = %artifact.branch, "Results published as new baseline");
                true
            }
            Err(err) => {
                // The comparison report was already produced for this run;
                // a failed upload does not retract it.
                self.metrics.record_publish_failure();
                self.incident(format!("publish failed: {err}"));
                false
            }
        }
    }

    fn advance(&mut self, next: PipelinePhase) {
        info!(from = self.phase.label(), to = next.label(), "Phase transition");
        self.phase = next;
    }

    fn incident(&mut self, message: String) {
        warn!(phase = self.phase.label(), "{message}");
        self.incidents.push(Incident {
            phase: self.phase,
            message,
        });
    }
}

fn fixture_env_name(fixture: &str) -> String {
    let mut name = String::from("BENCHGATE_FIXTURE_");
    for c in fixture.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}
