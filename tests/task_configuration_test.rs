//! Task configuration rows produced by the bundled IA asylum table

mod common;

use common::{bundled_service, name_value_table, service_for, write_resource};
use dmn_task_config::{DecisionKey, ErrorKind, OutputRow, ServiceError, Variables};
use serde_json::json;
use tempfile::TempDir;

const JURISDICTION: &str = "ia";
const CASE_TYPE: &str = "asylum";

struct Scenario {
    case_data: &'static str,
    case_name_value: Option<&'static str>,
    appeal_type_value: Option<&'static str>,
    region_value: Option<&'static str>,
    location_value: Option<&'static str>,
    location_name_value: Option<&'static str>,
}

fn scenarios() -> Vec<Scenario> {
    vec![Scenario {
        case_data: "",
        case_name_value: None,
        appeal_type_value: Some(""),
        region_value: Some("1"),
        location_value: Some("765324"),
        location_name_value: Some("Taylor House"),
    }]
}

fn minimal_variables(case_data: &str) -> Variables {
    Variables::new()
        .with("case", json!(case_data))
        .with("case.data.appealType", json!(""))
}

#[test]
fn test_when_case_then_return_name_and_value_rows() {
    let service = bundled_service();
    let key = DecisionKey::task_configuration(JURISDICTION, CASE_TYPE);

    for scenario in scenarios() {
        let expected = vec![
            OutputRow::new("caseName", scenario.case_name_value),
            OutputRow::new("appealType", scenario.appeal_type_value),
            OutputRow::new("region", scenario.region_value),
            OutputRow::new("location", scenario.location_value),
            OutputRow::new("locationName", scenario.location_name_value),
        ];

        let rows = service
            .evaluate_rows(&key, &minimal_variables(scenario.case_data))
            .unwrap();
        assert_eq!(rows, expected);
    }
}

#[test]
fn test_null_case_data_also_defaults_to_taylor_house() {
    let service = bundled_service();
    let key = DecisionKey::task_configuration(JURISDICTION, CASE_TYPE);
    let variables = Variables::new().with("case", serde_json::Value::Null);

    let rows = service.evaluate_rows(&key, &variables).unwrap();
    assert_eq!(rows[2], OutputRow::new("region", Some("1")));
    assert_eq!(rows[4], OutputRow::new("locationName", Some("Taylor House")));
    // appealType is unresolved, not empty
    assert_eq!(rows[1], OutputRow::new("appealType", None));
}

#[test]
fn test_case_data_overrides_default_location() {
    let service = bundled_service();
    let key = DecisionKey::task_configuration("IA", "Asylum");
    let variables = Variables::new().with(
        "case",
        json!({
            "data": {
                "appellantFamilyName": "Smith",
                "appealType": "protection",
                "staffLocation": "Hatton Cross",
                "caseManagementLocation": { "region": "1", "baseLocation": "386417" }
            }
        }),
    );

    let rows = service.evaluate_rows(&key, &variables).unwrap();
    assert_eq!(
        rows,
        vec![
            OutputRow::new("caseName", Some("Smith")),
            OutputRow::new("appealType", Some("protection")),
            OutputRow::new("region", Some("1")),
            OutputRow::new("location", Some("386417")),
            OutputRow::new("locationName", Some("Hatton Cross")),
        ]
    );
}

#[test]
fn test_evaluation_is_deterministic() {
    let service = bundled_service();
    let key = DecisionKey::task_configuration(JURISDICTION, CASE_TYPE);
    let variables = minimal_variables("");

    let first = service.evaluate(&key, &variables).unwrap();
    let second = service.evaluate(&key, &variables).unwrap();
    assert_eq!(first.rules, second.rules);
    assert_eq!(first.digest, second.digest);

    let fresh = service_for(&[common::resources_dir().as_path()]);
    assert_eq!(fresh.evaluate(&key, &variables).unwrap().rules, first.rules);
}

#[test]
fn test_missing_definition_is_resource_not_found() {
    let service = bundled_service();
    let key = DecisionKey::task_configuration(JURISDICTION, "bail");

    let err = service.evaluate_rows(&key, &Variables::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    assert!(matches!(err, ServiceError::ResourceNotFound(ref name) if name == "wa-task-configuration-ia-bail.dmn"));
}

#[test]
fn test_malformed_definition_is_evaluation_failure() {
    let temp_dir = TempDir::new().unwrap();
    write_resource(temp_dir.path(), "broken-ia-asylum", "<definitions><decision");

    let service = service_for(&[temp_dir.path()]);
    let err = service
        .evaluate(&DecisionKey::new("broken", "ia", "asylum"), &Variables::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EvaluationFailure);
}

#[test]
fn test_rows_keep_authored_order() {
    let temp_dir = TempDir::new().unwrap();
    let rows = [
        ("zeta", r#""1""#),
        ("alpha", r#""3""#),
        ("mid", "null"),
        ("alpha", r#""2""#),
    ];
    write_resource(
        temp_dir.path(),
        "ordering-test-case",
        &name_value_table("ordering-test-case", &rows),
    );

    let service = service_for(&[temp_dir.path()]);
    let key = DecisionKey::new("ordering", "test", "case");
    let names: Vec<_> = service
        .evaluate_rows(&key, &Variables::new())
        .unwrap()
        .into_iter()
        .map(|row| format!("{}={}", row.name, row.value.unwrap_or_default()))
        .collect();
    assert_eq!(names, vec!["zeta=1", "alpha=3", "mid=", "alpha=2"]);
}

#[test]
fn test_deeply_nested_cell_is_evaluation_failure() {
    let temp_dir = TempDir::new().unwrap();
    let value = format!("{}\"1\"{}", "(".repeat(5000), ")".repeat(5000));
    write_resource(
        temp_dir.path(),
        "nested-test-case",
        &name_value_table("nested-test-case", &[("deep", value.as_str())]),
    );

    let service = service_for(&[temp_dir.path()]);
    let err = service
        .evaluate(&DecisionKey::new("nested", "test", "case"), &Variables::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EvaluationFailure);
    assert!(err.to_string().contains("nested too deeply"));
}
