use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, warn};

use crate::artifact::{Artifact, BranchRef, CaseStatus, ResultRecord};
use crate::observability::MetricsCollector;
use crate::suite::{BudgetSpec, ResolvedCase, Suite};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const TIME_UNIT: &str = "seconds";

/// Everything a case's child process inherits from the triggering event:
/// identity for the artifact plus fixture locations exported as env vars.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub branch: BranchRef,
    pub commit: String,
    pub sequence: u64,
    pub env: Vec<(String, String)>,
    pub workdir: Option<PathBuf>,
}

/// Execute every case in `suite` and assemble the run's artifact. The
/// artifact carries one record per case no matter how many failed, so a
/// later comparison can tell "new" from "removed" correctly.
pub fn run_suite(
    suite: &Suite,
    ctx: &RunContext,
    metrics: &MetricsCollector,
) -> Result<Artifact> {
    let cases = suite.expand_cases()?;
    run_cases(&cases, ctx, metrics)
}

pub fn run_cases(
    cases: &[ResolvedCase],
    ctx: &RunContext,
    metrics: &MetricsCollector,
) -> Result<Artifact> {
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let span = tracing::span!(tracing::Level::DEBUG, "case", name = case.name.as_str());
        let _guard = span.enter();
        let record = run_case(case, ctx);
        metrics.record_case_outcome(record.status);
        if record.status != CaseStatus::Ok {
            warn!(
                case = case.name.as_str(),
                detail = record.detail.as_deref().unwrap_or(""),
                "Case did not complete cleanly"
            );
        }
        results.push(record);
    }
    Artifact::new(ctx.branch.clone(), ctx.commit.clone(), ctx.sequence, results)
}

/// One case, in isolation: failures and timeouts become the record's
/// status, never an error out of this function.
fn run_case(case: &ResolvedCase, ctx: &RunContext) -> ResultRecord {
    let budget = &case.budget;
    let deadline = Instant::now() + Duration::from_secs_f64(budget.max_seconds.max(0.0));
    let timeout = Duration::from_secs_f64(budget.timeout_seconds.max(0.001));
    let mut samples: Vec<f64> = Vec::new();

    loop {
        let below_floor = (samples.len() as u32) < budget.min_rounds;
        if !below_floor {
            if samples.len() as u32 >= budget.max_rounds || Instant::now() >= deadline {
                break;
            }
        }

        match run_round(case, ctx, timeout) {
            RoundOutcome::Completed(elapsed) => {
                debug!(
                    case = case.name.as_str(),
                    round = samples.len() + 1,
                    seconds = elapsed,
                    "Round completed"
                );
                samples.push(elapsed);
            }
            RoundOutcome::TimedOut => {
                return record_from_samples(
                    case,
                    &samples,
                    CaseStatus::Timeout,
                    Some(format!(
                        "round {} exceeded timeout of {:.3}s",
                        samples.len() + 1,
                        timeout.as_secs_f64()
                    )),
                );
            }
            RoundOutcome::Failed(detail) => {
                return record_from_samples(case, &samples, CaseStatus::Error, Some(detail));
            }
        }
    }

    record_from_samples(case, &samples, CaseStatus::Ok, None)
}

enum RoundOutcome {
    Completed(f64),
    TimedOut,
    Failed(String),
}

fn run_round(case: &ResolvedCase, ctx: &RunContext, timeout: Duration) -> RoundOutcome {
    let mut command = Command::new(&case.command);
    command
        .args(&case.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    for (key, value) in &ctx.env {
        command.env(key, value);
    }
    if let Some(dir) = &ctx.workdir {
        command.current_dir(dir);
    }

    let started = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            return RoundOutcome::Failed(format!(
                "failed to spawn '{}': {err}",
                case.command
            ));
        }
    };

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let elapsed = started.elapsed().as_secs_f64();
                if status.success() {
                    return RoundOutcome::Completed(elapsed);
                }
                return RoundOutcome::Failed(match status.code() {
                    Some(code) => format!("'{}' exited with status {code}", case.command),
                    None => format!("'{}' terminated by signal", case.command),
                });
            }
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return RoundOutcome::TimedOut;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return RoundOutcome::Failed(format!("failed to poll child: {err}"));
            }
        }
    }
}

fn record_from_samples(
    case: &ResolvedCase,
    samples: &[f64],
    status: CaseStatus,
    detail: Option<String>,
) -> ResultRecord {
    let stats = summarize(samples);
    ResultRecord {
        name: case.name.clone(),
        unit: TIME_UNIT.to_string(),
        status,
        rounds: samples.len() as u32,
        min: stats.map(|s| s.min),
        max: stats.map(|s| s.max),
        mean: stats.map(|s| s.mean),
        stddev: stats.and_then(|s| s.stddev),
        detail,
    }
}

#[derive(Clone, Copy)]
struct Stats {
    min: f64,
    max: f64,
    mean: f64,
    stddev: Option<f64>,
}

fn summarize(samples: &[f64]) -> Option<Stats> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let stddev = if samples.len() > 1 {
        let variance =
            samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(variance.sqrt())
    } else {
        None
    };
    Some(Stats {
        min,
        max,
        mean,
        stddev,
    })
}

/// Sanity check used by the budget validation: a budget that can never run
/// a round is a configuration mistake, not a runtime condition.
pub fn budget_is_satisfiable(budget: &BudgetSpec) -> bool {
    budget.min_rounds >= 1
        && budget.max_rounds >= budget.min_rounds
        && budget.timeout_seconds > 0.0
}
