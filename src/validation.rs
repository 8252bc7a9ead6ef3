use std::collections::HashSet;

use serde::Serialize;

use crate::runner::budget_is_satisfiable;
use crate::suite::{BudgetSpec, CaseSpec, Suite};

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_suite(suite: &Suite) -> ValidationReport {
    let mut report = ValidationReport::default();

    if suite.version != 1 {
        report
            .errors
            .push(format!("Unsupported suite version: {}", suite.version));
    }

    if suite.cases.is_empty() {
        report
            .errors
            .push("Suite must contain at least one case".into());
    }

    let mut names = HashSet::new();
    for (idx, case) in suite.cases.iter().enumerate() {
        if !names.insert(case.name.as_str()) {
            report
                .errors
                .push(format!("Duplicate case name '{}'", case.name));
        }
        report.merge(validate_case(idx, case));
    }

    report.merge(validate_budget("suite budget", &suite.budget));

    if suite.thresholds.regression_pct < 0.0 || suite.thresholds.improvement_pct < 0.0 {
        report
            .errors
            .push("Thresholds must be non-negative percentages".into());
    } else if suite.thresholds.regression_pct < 1.0 {
        report.warnings.push(format!(
            "Regression threshold {:.2}% is tighter than typical timing noise",
            suite.thresholds.regression_pct
        ));
    }

    for (idx, fixture) in suite.fixtures.iter().enumerate() {
        if fixture.name.trim().is_empty() {
            report
                .errors
                .push(format!("Fixture {} has an empty name", idx + 1));
        }
        if fixture.source.as_os_str().is_empty() {
            report.errors.push(format!(
                "Fixture '{}' has an empty source path",
                fixture.name
            ));
        }
        if fixture.version.trim().is_empty() {
            report.warnings.push(format!(
                "Fixture '{}' has no version; its cache entry only invalidates on tool upgrades",
                fixture.name
            ));
        }
    }

    report
}

fn validate_case(idx: usize, case: &CaseSpec) -> ValidationReport {
    let mut report = ValidationReport::default();

    if case.name.trim().is_empty() {
        report.errors.push(format!("Case {} has an empty name", idx + 1));
    }

    if case.command.trim().is_empty() {
        report
            .errors
            .push(format!("Case '{}' has an empty command", case.name));
    }

    if let Some(pattern) = &case.inputs
        && let Err(err) = glob::Pattern::new(pattern)
    {
        report.errors.push(format!(
            "Case '{}' input pattern '{}' is not a valid glob: {}",
            case.name, pattern, err
        ));
    }

    if let Some(budget) = &case.budget {
        report.merge(validate_budget(&format!("case '{}' budget", case.name), budget));
    }

    report
}

fn validate_budget(label: &str, budget: &BudgetSpec) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !budget_is_satisfiable(budget) {
        report.errors.push(format!(
            "{label} cannot run a round (min_rounds {}, max_rounds {}, timeout {:.3}s)",
            budget.min_rounds, budget.max_rounds, budget.timeout_seconds
        ));
    }
    if budget.max_seconds < 0.0 {
        report
            .errors
            .push(format!("{label} has a negative time budget"));
    }
    if budget.timeout_seconds > 0.0 && budget.max_seconds > 0.0
        && budget.timeout_seconds > budget.max_seconds * 10.0
    {
        report.warnings.push(format!(
            "{label}: per-round timeout {:.1}s dwarfs the case budget {:.1}s",
            budget.timeout_seconds, budget.max_seconds
        ));
    }

    report
}
