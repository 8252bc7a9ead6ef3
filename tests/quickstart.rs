use std::path::Path;

use benchgate::suite::Suite;
use benchgate::validation::validate_suite;

#[test]
fn quickstart_suite_is_valid() {
    let suite = Suite::load(Path::new("suites/quickstart.yaml"))
        .expect("quickstart suite should load");
    let report = validate_suite(&suite);
    assert!(
        report.is_ok(),
        "quickstart suite should pass validation: {:?}",
        report.errors
    );
}
