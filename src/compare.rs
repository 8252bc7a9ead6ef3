use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, CaseStatus};

/// Symmetric percent thresholds on the primary metric (mean wall time).
/// Regression is directional: a higher mean is worse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_threshold_pct")]
    pub regression_pct: f64,
    #[serde(default = "default_threshold_pct")]
    pub improvement_pct: f64,
}

fn default_threshold_pct() -> f64 {
    10.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            regression_pct: default_threshold_pct(),
            improvement_pct: default_threshold_pct(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Improved,
    Regressed,
    Unchanged,
    New,
    Removed,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseDelta {
    pub name: String,
    pub baseline_mean: Option<f64>,
    pub current_mean: Option<f64>,
    pub delta_pct: Option<f64>,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComparisonSummary {
    pub improved: usize,
    pub regressed: usize,
    pub unchanged: usize,
    pub new: usize,
    pub removed: usize,
    pub inconclusive: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BaselineInfo {
    pub commit: String,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

/// Derived on every comparison; never persisted to the artifact store.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub baseline: Option<BaselineInfo>,
    pub current_commit: String,
    pub thresholds: Thresholds,
    pub cases: Vec<CaseDelta>,
    pub summary: ComparisonSummary,
}

impl ComparisonReport {
    pub fn has_regressions(&self) -> bool {
        self.summary.regressed > 0
    }
}

pub fn compare(
    baseline: Option<&Artifact>,
    current: &Artifact,
    thresholds: &Thresholds,
) -> ComparisonReport {
    let mut cases = Vec::with_capacity(current.results.len());

    for record in &current.results {
        let base = baseline.and_then(|b| b.record(&record.name));
        cases.push(compare_case(base, record, thresholds));
    }

    // Cases that vanished since the baseline, in baseline order.
    if let Some(base) = baseline {
        for record in &base.results {
            if current.record(&record.name).is_none() {
                cases.push(CaseDelta {
                    name: record.name.clone(),
                    baseline_mean: record.mean,
                    current_mean: None,
                    delta_pct: None,
                    verdict: Verdict::Removed,
                    note: None,
                });
            }
        }
    }

    let mut summary = ComparisonSummary::default();
    for case in &cases {
        match case.verdict {
            Verdict::Improved => summary.improved += 1,
            Verdict::Regressed => summary.regressed += 1,
            Verdict::Unchanged => summary.unchanged += 1,
            Verdict::New => summary.new += 1,
            Verdict::Removed => summary.removed += 1,
            Verdict::Inconclusive => summary.inconclusive += 1,
        }
    }

    ComparisonReport {
        baseline: baseline.map(|b| BaselineInfo {
            commit: b.commit.clone(),
            created_at: b.created_at,
            sequence: b.sequence,
        }),
        current_commit: current.commit.clone(),
        thresholds: *thresholds,
        cases,
        summary,
    }
}

fn compare_case(
    baseline: Option<&crate::artifact::ResultRecord>,
    current: &crate::artifact::ResultRecord,
    thresholds: &Thresholds,
) -> CaseDelta {
    let Some(base) = baseline else {
        return CaseDelta {
            name: current.name.clone(),
            baseline_mean: None,
            current_mean: current.mean,
            delta_pct: None,
            verdict: Verdict::New,
            note: None,
        };
    };

    // A failed side has no defined numeric comparison.
    if base.status != CaseStatus::Ok || current.status != CaseStatus::Ok {
        let note = match (base.status, current.status) {
            (CaseStatus::Ok, s) => format!("current run ended with status {}", status_label(s)),
            (s, CaseStatus::Ok) => format!("baseline run ended with status {}", status_label(s)),
            (b, c) => format!(
                "both runs failed (baseline {}, current {})",
                status_label(b),
                status_label(c)
            ),
        };
        return CaseDelta {
            name: current.name.clone(),
            baseline_mean: base.mean,
            current_mean: current.mean,
            delta_pct: None,
            verdict: Verdict::Inconclusive,
            note: Some(note),
        };
    }

    let (Some(base_mean), Some(cur_mean)) = (base.mean, current.mean) else {
        return CaseDelta {
            name: current.name.clone(),
            baseline_mean: base.mean,
            current_mean: current.mean,
            delta_pct: None,
            verdict: Verdict::Inconclusive,
            note: Some("missing mean on one side".into()),
        };
    };

    let delta_pct = if base_mean == 0.0 {
        None
    } else {
        Some((cur_mean - base_mean) / base_mean * 100.0)
    };

    let verdict = match delta_pct {
        Some(delta) if delta > thresholds.regression_pct => Verdict::Regressed,
        Some(delta) if delta < -thresholds.improvement_pct => Verdict::Improved,
        Some(_) => Verdict::Unchanged,
        None => Verdict::Inconclusive,
    };

    CaseDelta {
        name: current.name.clone(),
        baseline_mean: Some(base_mean),
        current_mean: Some(cur_mean),
        delta_pct,
        verdict,
        note: (verdict == Verdict::Inconclusive).then(|| "baseline mean is zero".to_string()),
    }
}

fn status_label(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Ok => "ok",
        CaseStatus::Error => "error",
        CaseStatus::Timeout => "timeout",
    }
}
