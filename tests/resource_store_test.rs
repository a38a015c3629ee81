//! ResourceStore lookups across multiple resource directories

mod common;

use common::{name_value_table, service_for, write_resource};
use dmn_task_config::dmn::ResourceStore;
use dmn_task_config::{ServiceError, Variables};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_first_directory_wins() {
    let temp_dir = TempDir::new().unwrap();
    let primary = temp_dir.path().join("primary");
    let fallback = temp_dir.path().join("fallback");

    write_resource(&primary, "shared", &name_value_table("shared", &[("source", r#""primary""#)]));
    write_resource(&fallback, "shared", &name_value_table("shared", &[("source", r#""fallback""#)]));
    write_resource(&fallback, "only-fallback", &name_value_table("only-fallback", &[("source", r#""fallback""#)]));

    let service = service_for(&[primary.as_path(), fallback.as_path()]);
    let shared = service.evaluate_by_name("shared", &Variables::new()).unwrap();
    assert_eq!(shared.output_rows().unwrap()[0].value.as_deref(), Some("primary"));

    let fallback_only = service.evaluate_by_name("only-fallback", &Variables::new()).unwrap();
    assert_eq!(fallback_only.output_rows().unwrap()[0].value.as_deref(), Some("fallback"));
}

#[test]
fn test_missing_directories_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let existing = temp_dir.path().join("existing");
    write_resource(&existing, "table", &name_value_table("table", &[("a", r#""1""#)]));

    let store = ResourceStore::with_directories(vec![temp_dir.path().join("absent"), existing]);
    assert!(store.resolve("table").is_ok());
    assert_eq!(store.list(None).unwrap().len(), 1);
}

#[test]
fn test_list_filters_and_deduplicates() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("first");
    let second = temp_dir.path().join("second");

    write_resource(&first, "wa-task-configuration-ia-asylum", "<definitions/>");
    write_resource(&first.join("nested"), "wa-task-configuration-ia-bail", "<definitions/>");
    write_resource(&second, "wa-task-configuration-ia-asylum", "<definitions/>");
    write_resource(&second, "wa-task-types-ia-asylum", "<definitions/>");
    fs::write(second.join("notes.txt"), "not a decision").unwrap();

    let store = ResourceStore::with_directories(vec![first.clone(), second]);

    let all = store.list(None).unwrap();
    let ids: Vec<_> = all.iter().map(|r| r.decision_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "wa-task-configuration-ia-asylum",
            "wa-task-configuration-ia-bail",
            "wa-task-types-ia-asylum",
        ]
    );
    assert!(all[0].file_path.starts_with(first.to_string_lossy().as_ref()));

    let filtered = store.list(Some("wa-task-configuration-*")).unwrap();
    assert_eq!(filtered.len(), 2);

    assert!(matches!(store.list(Some("[")), Err(ServiceError::Glob(_))));
}

#[test]
fn test_path_traversal_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let store = ResourceStore::new(temp_dir.path().join("resources"));
    let err = store.read("../outside").unwrap_err();
    assert!(matches!(err, ServiceError::ParserError(_)));
    assert!(!err.is_not_found());
}
