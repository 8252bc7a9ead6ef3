use assert_cmd::Command;
use benchgate::artifact::{Artifact, BranchRef, CaseStatus, ResultRecord};
use tempfile::tempdir;

fn record(name: &str, mean: f64) -> ResultRecord {
    ResultRecord {
        name: name.to_string(),
        unit: "seconds".to_string(),
        status: CaseStatus::Ok,
        rounds: 3,
        min: Some(mean),
        max: Some(mean),
        mean: Some(mean),
        stddev: None,
        detail: None,
    }
}

fn benchgate() -> Command {
    Command::cargo_bin("benchgate").expect("binary present")
}

#[test]
fn generated_preset_passes_validation() {
    let temp = tempdir().unwrap();
    let suite_path = temp.path().join("quick.yaml");

    benchgate()
        .args([
            "suite",
            "new",
            "--preset",
            "quick",
            "--output",
            suite_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    benchgate()
        .args(["validate", suite_path.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn validation_rejects_a_caseless_suite() {
    let temp = tempdir().unwrap();
    let suite_path = temp.path().join("empty.yaml");
    std::fs::write(&suite_path, "version: 1\ncases: []\n").unwrap();

    benchgate()
        .args(["validate", suite_path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn compare_command_reports_verdicts() {
    let temp = tempdir().unwrap();
    let baseline_path = temp.path().join("baseline.json");
    let current_path = temp.path().join("current.json");

    Artifact::new(
        BranchRef::new("develop"),
        "base",
        1,
        vec![record("parse", 10.0)],
    )
    .unwrap()
    .save(&baseline_path)
    .unwrap();
    Artifact::new(
        BranchRef::new("develop"),
        "cur",
        2,
        vec![record("parse", 12.0)],
    )
    .unwrap()
    .save(&current_path)
    .unwrap();

    let assert = benchgate()
        .args([
            "compare",
            baseline_path.to_str().unwrap(),
            current_path.to_str().unwrap(),
            "--regression-threshold",
            "10",
        ])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("regressed"), "stdout was: {stdout}");
    assert!(stdout.contains("+20.00%"), "stdout was: {stdout}");
}

#[test]
fn publish_then_fetch_roundtrips_through_the_store() {
    let temp = tempdir().unwrap();
    let store_dir = temp.path().join("store");
    let artifact_path = temp.path().join("artifact.json");

    Artifact::new(
        BranchRef::new("develop"),
        "abc1234",
        1,
        vec![record("parse", 1.0)],
    )
    .unwrap()
    .save(&artifact_path)
    .unwrap();

    benchgate()
        .args([
            "publish",
            "--store",
            store_dir.to_str().unwrap(),
            artifact_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let assert = benchgate()
        .args([
            "fetch",
            "--store",
            store_dir.to_str().unwrap(),
            "--branch",
            "develop",
        ])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("abc1234"), "stdout was: {stdout}");
}

#[test]
fn list_cases_expands_the_suite() {
    let temp = tempdir().unwrap();
    let suite_path = temp.path().join("suite.yaml");
    std::fs::write(
        &suite_path,
        r#"version: 1
cases:
  - name: noop
    command: "true"
  - name: shell
    command: sh
    args: ["-c", "exit 0"]
"#,
    )
    .unwrap();

    let assert = benchgate()
        .args(["list-cases", suite_path.to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("noop"));
    assert!(stdout.contains("shell"));
}

#[test]
fn digest_prints_a_stable_hash() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("artifact.json");
    std::fs::write(&file_path, b"benchgate").unwrap();

    let assert = benchgate()
        .args(["digest", "--path", file_path.to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.starts_with("db152aba6a2ba7cdee22dab03eefc6e129a8e58c5ed1f6559458b0c988498691"));
}
