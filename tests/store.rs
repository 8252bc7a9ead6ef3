use std::fs;

use benchgate::artifact::{Artifact, BranchRef, CaseStatus, ResultRecord};
use benchgate::store::ArtifactStore;
use tempfile::tempdir;

fn record(name: &str, mean: f64) -> ResultRecord {
    ResultRecord {
        name: name.to_string(),
        unit: "seconds".to_string(),
        status: CaseStatus::Ok,
        rounds: 3,
        min: Some(mean * 0.9),
        max: Some(mean * 1.1),
        mean: Some(mean),
        stddev: Some(mean * 0.05),
        detail: None,
    }
}

fn artifact(branch: &str, commit: &str, sequence: u64, cases: &[(&str, f64)]) -> Artifact {
    let records = cases.iter().map(|(name, mean)| record(name, *mean)).collect();
    Artifact::new(BranchRef::new(branch), commit, sequence, records).expect("unique case names")
}

#[test]
fn fetch_latest_without_publish_is_not_found() {
    let temp = tempdir().unwrap();
    let store = ArtifactStore::open(temp.path());

    let err = store
        .fetch_latest(&BranchRef::new("develop"))
        .expect_err("empty store should miss");
    assert!(err.is_not_found());
}

#[test]
fn publish_then_fetch_returns_exactly_that_artifact() {
    let temp = tempdir().unwrap();
    let store = ArtifactStore::open(temp.path());
    let published = artifact("develop", "abc1234", 1, &[("parse", 1.0), ("render", 2.0)]);

    store.publish(&published).unwrap();

    let fetched = store.fetch_latest(&BranchRef::new("develop")).unwrap();
    assert_eq!(fetched.commit, "abc1234");
    assert_eq!(fetched.sequence, 1);
    assert_eq!(fetched.results.len(), 2);
    assert_eq!(fetched.record("parse").unwrap().mean, Some(1.0));
}

#[test]
fn second_publish_supersedes_first() {
    let temp = tempdir().unwrap();
    let store = ArtifactStore::open(temp.path());

    store
        .publish(&artifact("develop", "commit-a", 1, &[("parse", 1.0)]))
        .unwrap();
    store
        .publish(&artifact("develop", "commit-b", 2, &[("parse", 1.1)]))
        .unwrap();

    let fetched = store.fetch_latest(&BranchRef::new("develop")).unwrap();
    assert_eq!(fetched.commit, "commit-b");
    assert_eq!(fetched.sequence, 2);
}

#[test]
fn branches_do_not_share_baselines() {
    let temp = tempdir().unwrap();
    let store = ArtifactStore::open(temp.path());

    store
        .publish(&artifact("develop", "commit-a", 1, &[("parse", 1.0)]))
        .unwrap();

    let err = store
        .fetch_latest(&BranchRef::new("release/1.0"))
        .expect_err("other branch has no baseline");
    assert!(err.is_not_found());

    store
        .publish(&artifact("release/1.0", "commit-r", 1, &[("parse", 1.0)]))
        .unwrap();
    let fetched = store.fetch_latest(&BranchRef::new("release/1.0")).unwrap();
    assert_eq!(fetched.commit, "commit-r");
}

#[test]
fn missing_pointer_recovers_latest_by_scan() {
    let temp = tempdir().unwrap();
    let store = ArtifactStore::open(temp.path());

    store
        .publish(&artifact("develop", "commit-a", 1, &[("parse", 1.0)]))
        .unwrap();
    store
        .publish(&artifact("develop", "commit-b", 2, &[("parse", 1.1)]))
        .unwrap();

    fs::remove_file(temp.path().join("develop").join("LATEST")).unwrap();

    let fetched = store.fetch_latest(&BranchRef::new("develop")).unwrap();
    assert_eq!(fetched.commit, "commit-b");
}

#[test]
fn tampered_artifact_is_reported_corrupt() {
    let temp = tempdir().unwrap();
    let store = ArtifactStore::open(temp.path());
    let published = artifact("develop", "abc1234", 1, &[("parse", 1.0)]);

    store.publish(&published).unwrap();

    let branch_dir = temp.path().join("develop");
    let pointer = fs::read_to_string(branch_dir.join("LATEST")).unwrap();
    let artifact_path = branch_dir.join(pointer.trim());
    let mut tampered = artifact("develop", "abc1234", 1, &[("parse", 9.9)]);
    tampered.created_at = published.created_at;
    fs::write(
        &artifact_path,
        serde_json::to_vec_pretty(&tampered).unwrap(),
    )
    .unwrap();

    let err = store
        .fetch_latest(&BranchRef::new("develop"))
        .expect_err("digest mismatch should surface");
    assert!(matches!(err, benchgate::errors::StoreError::Corrupt { .. }));
}

#[test]
fn forward_compatible_artifacts_ignore_unknown_fields() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("future.json");
    let json = serde_json::json!({
        "schema_version": 7,
        "branch": "develop",
        "commit": "abc1234",
        "created_at": "2026-08-01T12:00:00Z",
        "sequence": 4,
        "flux_capacitance": {"unknown": true},
        "results": [{
            "name": "parse",
            "unit": "seconds",
            "status": "ok",
            "rounds": 3,
            "mean": 1.5,
            "percentiles": [0.5, 0.9]
        }]
    });
    fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

    let artifact = Artifact::load(&path).expect("newer fields must be ignored");
    assert_eq!(artifact.sequence, 4);
    assert_eq!(artifact.record("parse").unwrap().mean, Some(1.5));
    assert_eq!(artifact.record("parse").unwrap().stddev, None);
}
