// Common test utilities
#![allow(dead_code)]

use dmn_task_config::DecisionService;
use dmn_task_config::config::ServiceConfig;
use std::fs;
use std::path::{Path, PathBuf};

pub fn resources_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("resources")
}

pub fn scenarios_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

pub fn bundled_service() -> DecisionService {
    DecisionService::new(ServiceConfig::with_resource_directories(vec![resources_dir()]))
}

/// A COLLECT name/value table with one rule per `(name, value expression)` pair
pub fn name_value_table(decision_id: &str, rows: &[(&str, &str)]) -> String {
    let rules: String = rows
        .iter()
        .enumerate()
        .map(|(i, (name, value))| {
            format!(
                r#"
    <rule id="rule_{i}">
      <inputEntry><text>-</text></inputEntry>
      <outputEntry><text>"{name}"</text></outputEntry>
      <outputEntry><text>{value}</text></outputEntry>
    </rule>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="https://www.omg.org/spec/DMN/20191111/MODEL/" id="defs_{decision_id}" name="{decision_id}">
  <decision id="{decision_id}" name="{decision_id}">
    <decisionTable hitPolicy="COLLECT">
      <input label="Case"><inputExpression><text>case</text></inputExpression></input>
      <output name="name" typeRef="string"/>
      <output name="value" typeRef="string"/>{rules}
    </decisionTable>
  </decision>
</definitions>"#
    )
}

pub fn write_resource(dir: &Path, decision_id: &str, content: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{decision_id}.dmn"));
    fs::write(&path, content).unwrap();
    path
}

pub fn service_for(dirs: &[&Path]) -> DecisionService {
    DecisionService::new(ServiceConfig::with_resource_directories(
        dirs.iter().map(|d| d.to_path_buf()).collect(),
    ))
}
