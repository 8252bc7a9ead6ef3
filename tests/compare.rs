use benchgate::artifact::{Artifact, BranchRef, CaseStatus, ResultRecord};
use benchgate::compare::{Thresholds, Verdict, compare};

fn record(name: &str, mean: f64) -> ResultRecord {
    ResultRecord {
        name: name.to_string(),
        unit: "seconds".to_string(),
        status: CaseStatus::Ok,
        rounds: 5,
        min: Some(mean * 0.95),
        max: Some(mean * 1.05),
        mean: Some(mean),
        stddev: Some(mean * 0.02),
        detail: None,
    }
}

fn failed_record(name: &str, status: CaseStatus) -> ResultRecord {
    ResultRecord {
        name: name.to_string(),
        unit: "seconds".to_string(),
        status,
        rounds: 0,
        min: None,
        max: None,
        mean: None,
        stddev: None,
        detail: Some("boom".to_string()),
    }
}

fn artifact(commit: &str, records: Vec<ResultRecord>) -> Artifact {
    Artifact::new(BranchRef::new("develop"), commit, 1, records).unwrap()
}

fn verdict_of<'a>(report: &'a benchgate::compare::ComparisonReport, name: &str) -> &'a Verdict {
    &report
        .cases
        .iter()
        .find(|c| c.name == name)
        .expect("case present in report")
        .verdict
}

#[test]
fn self_comparison_is_unchanged_with_zero_delta() {
    let a = artifact(
        "abc1234",
        vec![record("parse_1k_files", 10.0), record("render", 0.5)],
    );

    let report = compare(Some(&a), &a, &Thresholds::default());

    assert_eq!(report.summary.unchanged, 2);
    assert_eq!(report.summary.regressed, 0);
    assert_eq!(report.summary.improved, 0);
    for case in &report.cases {
        assert_eq!(case.verdict, Verdict::Unchanged);
        assert_eq!(case.delta_pct, Some(0.0));
    }
}

#[test]
fn missing_baseline_marks_every_case_new() {
    let current = artifact("abc1234", vec![record("parse", 1.0), record("render", 2.0)]);

    let report = compare(None, &current, &Thresholds::default());

    assert!(report.baseline.is_none());
    assert_eq!(report.summary.new, 2);
    assert!(report.cases.iter().all(|c| c.verdict == Verdict::New));
}

#[test]
fn threshold_worked_example() {
    // baseline mean 10.0s, threshold 10%: 12.0s is +20% -> regressed,
    // 10.05s is +0.5% -> unchanged.
    let baseline = artifact("base", vec![record("parse_1k_files", 10.0)]);
    let thresholds = Thresholds {
        regression_pct: 10.0,
        improvement_pct: 10.0,
    };

    let regressed = artifact("cur1", vec![record("parse_1k_files", 12.0)]);
    let report = compare(Some(&baseline), &regressed, &thresholds);
    assert_eq!(*verdict_of(&report, "parse_1k_files"), Verdict::Regressed);
    let delta = report.cases[0].delta_pct.unwrap();
    assert!((delta - 20.0).abs() < 1e-9);

    let unchanged = artifact("cur2", vec![record("parse_1k_files", 10.05)]);
    let report = compare(Some(&baseline), &unchanged, &thresholds);
    assert_eq!(*verdict_of(&report, "parse_1k_files"), Verdict::Unchanged);
}

#[test]
fn improvement_beyond_threshold_is_flagged() {
    let baseline = artifact("base", vec![record("parse", 10.0)]);
    let current = artifact("cur", vec![record("parse", 8.0)]);

    let report = compare(Some(&baseline), &current, &Thresholds::default());

    assert_eq!(*verdict_of(&report, "parse"), Verdict::Improved);
    assert_eq!(report.summary.improved, 1);
}

#[test]
fn added_and_dropped_cases_are_tracked() {
    let baseline = artifact("base", vec![record("old_case", 1.0), record("shared", 2.0)]);
    let current = artifact("cur", vec![record("shared", 2.0), record("new_case", 3.0)]);

    let report = compare(Some(&baseline), &current, &Thresholds::default());

    assert_eq!(*verdict_of(&report, "shared"), Verdict::Unchanged);
    assert_eq!(*verdict_of(&report, "new_case"), Verdict::New);
    assert_eq!(*verdict_of(&report, "old_case"), Verdict::Removed);
    assert_eq!(report.summary.new, 1);
    assert_eq!(report.summary.removed, 1);
}

#[test]
fn failed_sides_are_inconclusive_not_compared() {
    let baseline = artifact(
        "base",
        vec![record("stable", 1.0), record("flaky", 2.0), failed_record("hung", CaseStatus::Timeout)],
    );
    let current = artifact(
        "cur",
        vec![
            record("stable", 1.0),
            failed_record("flaky", CaseStatus::Error),
            record("hung", 4.0),
        ],
    );

    let report = compare(Some(&baseline), &current, &Thresholds::default());

    assert_eq!(*verdict_of(&report, "stable"), Verdict::Unchanged);
    assert_eq!(*verdict_of(&report, "flaky"), Verdict::Inconclusive);
    assert_eq!(*verdict_of(&report, "hung"), Verdict::Inconclusive);
    assert_eq!(report.summary.inconclusive, 2);

    let flaky = report.cases.iter().find(|c| c.name == "flaky").unwrap();
    assert!(flaky.delta_pct.is_none());
    assert!(flaky.note.as_deref().unwrap().contains("error"));
}

#[test]
fn report_always_covers_the_full_case_set() {
    let baseline = artifact("base", vec![record("a", 1.0), record("b", 2.0)]);
    let current = artifact(
        "cur",
        vec![failed_record("a", CaseStatus::Error), record("c", 3.0)],
    );

    let report = compare(Some(&baseline), &current, &Thresholds::default());

    let names: Vec<&str> = report.cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c", "b"]);
}
