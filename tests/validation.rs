use std::path::PathBuf;

use benchgate::compare::Thresholds;
use benchgate::suite::{BudgetSpec, CaseSpec, FixtureSpec, Suite};
use benchgate::validation::validate_suite;

fn base_suite() -> Suite {
    Suite {
        version: 1,
        budget: BudgetSpec::default(),
        thresholds: Thresholds::default(),
        gate_regressions: false,
        fixtures: Vec::new(),
        cases: vec![case("noop", "true")],
    }
}

fn case(name: &str, command: &str) -> CaseSpec {
    CaseSpec {
        name: name.to_string(),
        command: command.to_string(),
        args: Vec::new(),
        inputs: None,
        budget: None,
    }
}

#[test]
fn well_formed_suite_passes() {
    let report = validate_suite(&base_suite());
    assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
}

#[test]
fn unsupported_version_fails() {
    let mut suite = base_suite();
    suite.version = 2;

    let report = validate_suite(&suite);
    assert!(!report.is_ok());
    assert!(report.errors[0].contains("version"));
}

#[test]
fn empty_case_list_fails() {
    let mut suite = base_suite();
    suite.cases.clear();

    assert!(!validate_suite(&suite).is_ok());
}

#[test]
fn duplicate_case_names_fail() {
    let mut suite = base_suite();
    suite.cases.push(case("noop", "false"));

    let report = validate_suite(&suite);
    assert!(!report.is_ok());
    assert!(report.errors.iter().any(|e| e.contains("Duplicate")));
}

#[test]
fn empty_command_fails() {
    let mut suite = base_suite();
    suite.cases.push(case("empty", "  "));

    assert!(!validate_suite(&suite).is_ok());
}

#[test]
fn invalid_input_glob_fails() {
    let mut suite = base_suite();
    let mut bad = case("globbed", "true");
    bad.inputs = Some("data/[".to_string());
    suite.cases.push(bad);

    let report = validate_suite(&suite);
    assert!(!report.is_ok());
    assert!(report.errors.iter().any(|e| e.contains("glob")));
}

#[test]
fn unsatisfiable_budget_fails() {
    let mut suite = base_suite();
    suite.budget = BudgetSpec {
        min_rounds: 0,
        max_rounds: 0,
        max_seconds: 1.0,
        timeout_seconds: 1.0,
    };

    assert!(!validate_suite(&suite).is_ok());
}

#[test]
fn per_case_budget_is_checked_too() {
    let mut suite = base_suite();
    let mut bad = case("tight", "true");
    bad.budget = Some(BudgetSpec {
        min_rounds: 5,
        max_rounds: 2,
        max_seconds: 1.0,
        timeout_seconds: 1.0,
    });
    suite.cases.push(bad);

    let report = validate_suite(&suite);
    assert!(!report.is_ok());
    assert!(report.errors.iter().any(|e| e.contains("tight")));
}

#[test]
fn unversioned_fixture_warns_but_passes() {
    let mut suite = base_suite();
    suite.fixtures.push(FixtureSpec {
        name: "corpus".to_string(),
        source: PathBuf::from("./corpus"),
        version: String::new(),
    });

    let report = validate_suite(&suite);
    assert!(report.is_ok());
    assert!(report.warnings.iter().any(|w| w.contains("corpus")));
}

#[test]
fn tight_threshold_warns() {
    let mut suite = base_suite();
    suite.thresholds = Thresholds {
        regression_pct: 0.5,
        improvement_pct: 10.0,
    };

    let report = validate_suite(&suite);
    assert!(report.is_ok());
    assert!(!report.warnings.is_empty());
}
