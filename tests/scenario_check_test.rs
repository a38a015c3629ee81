//! Running YAML scenario fixtures through the checker

mod common;

use common::{bundled_service, scenarios_dir};
use dmn_task_config::scenario::{ScenarioFile, ScenarioRunner};
use dmn_task_config::ErrorKind;

#[test]
fn test_bundled_scenarios_pass() {
    let service = bundled_service();
    let file = ScenarioFile::from_file(&scenarios_dir().join("wa-task-configuration-ia-asylum.yaml"))
        .unwrap();

    let reports = ScenarioRunner::new(&service).run(&file).unwrap();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert!(report.passed, "{}: {:?}", report.name, report.mismatch_summary());
    }
}

#[test]
fn test_reordered_expectation_fails() {
    let service = bundled_service();
    let file = ScenarioFile::from_yaml(
        r#"
decision: { domain: wa-task-configuration, jurisdiction: ia, caseType: asylum }
scenarios:
  - name: region before case name
    variables: { case: "", case.data.appealType: "" }
    expected:
      - { name: region, value: "1" }
      - { name: caseName, value: null }
      - { name: appealType, value: "" }
      - { name: location, value: "765324" }
      - { name: locationName, value: Taylor House }
"#,
    )
    .unwrap();

    let reports = ScenarioRunner::new(&service).run(&file).unwrap();
    assert!(!reports[0].passed);
    assert_eq!(reports[0].first_mismatch, Some(0));
    assert_eq!(reports[0].actual.len(), 5);
}

#[test]
fn test_unknown_decision_aborts_run() {
    let service = bundled_service();
    let file = ScenarioFile::from_yaml(
        r#"
decision: { domain: wa-task-configuration, jurisdiction: ia, caseType: unknown }
scenarios:
  - name: anything
    expected: []
"#,
    )
    .unwrap();

    let err = ScenarioRunner::new(&service).run(&file).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
}
