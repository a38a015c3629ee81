//! # Scenario fixtures
//!
//! YAML files pairing input variables with the exact rows a decision must
//! produce. A file targets one decision:
//!
//! ```yaml
//! decision:
//!   domain: wa-task-configuration
//!   jurisdiction: ia
//!   caseType: asylum
//! scenarios:
//!   - name: given case data is missing then default to Taylor House
//!     variables:
//!       case: ""
//!       case.data.appealType: ""
//!     expected:
//!       - { name: caseName, value: null }
//!       - { name: appealType, value: "" }
//! ```

use crate::dmn::DecisionService;
use crate::errors::ServiceError;
use crate::types::{DecisionKey, OutputRow, Variables};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioFile {
    pub decision: DecisionKey,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub variables: Variables,
    pub expected: Vec<OutputRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    pub expected: Vec<OutputRow>,
    pub actual: Vec<OutputRow>,
    /// Index of the first row that differs, or the shorter length when one list is a prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_mismatch: Option<usize>,
}

impl ScenarioReport {
    /// One-line description of the first difference
    pub fn mismatch_summary(&self) -> Option<String> {
        let index = self.first_mismatch?;
        let describe = |row: Option<&OutputRow>| {
            row.map(ToString::to_string)
                .unwrap_or_else(|| "<missing>".to_string())
        };
        Some(format!(
            "row {index}: expected {}, got {}",
            describe(self.expected.get(index)),
            describe(self.actual.get(index))
        ))
    }
}

impl ScenarioFile {
    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ServiceError> {
        serde_yaml::from_str(yaml).map_err(ServiceError::from)
    }
}

/// Runs scenario files against a [`DecisionService`].
pub struct ScenarioRunner<'a> {
    service: &'a DecisionService,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(service: &'a DecisionService) -> Self {
        Self { service }
    }

    /// Evaluate every scenario. Load and evaluation errors abort the run.
    pub fn run(&self, file: &ScenarioFile) -> Result<Vec<ScenarioReport>, ServiceError> {
        file.scenarios
            .iter()
            .map(|scenario| self.check(&file.decision, scenario))
            .collect()
    }

    pub fn check(
        &self,
        key: &DecisionKey,
        scenario: &Scenario,
    ) -> Result<ScenarioReport, ServiceError> {
        let actual = self.service.evaluate_rows(key, &scenario.variables)?;
        let first_mismatch = first_mismatch(&scenario.expected, &actual);

        if let Some(index) = first_mismatch {
            tracing::debug!(scenario = %scenario.name, row = index, "scenario mismatch");
        }

        Ok(ScenarioReport {
            name: scenario.name.clone(),
            passed: first_mismatch.is_none(),
            expected: scenario.expected.clone(),
            actual,
            first_mismatch,
        })
    }
}

fn first_mismatch(expected: &[OutputRow], actual: &[OutputRow]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario_file() {
        let yaml = r#"
decision:
  domain: wa-task-configuration
  jurisdiction: IA
  caseType: Asylum
scenarios:
  - name: missing case data
    variables:
      case: ""
      case.data.appealType: ""
    expected:
      - { name: caseName, value: null }
      - { name: region, value: "1" }
"#;
        let file = ScenarioFile::from_yaml(yaml).unwrap();
        assert_eq!(file.decision.jurisdiction, "ia");
        assert_eq!(file.decision.case_type, "asylum");
        assert_eq!(file.decision.decision_id(), "wa-task-configuration-ia-asylum");
        assert_eq!(file.scenarios.len(), 1);
        let scenario = &file.scenarios[0];
        assert_eq!(scenario.variables.len(), 2);
        assert_eq!(scenario.expected[0], OutputRow::new("caseName", None));
        assert_eq!(scenario.expected[1], OutputRow::new("region", Some("1")));
    }

    #[test]
    fn test_missing_file_keeps_io_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let err = ScenarioFile::from_file(&temp_dir.path().join("absent.yaml")).unwrap_err();
        assert!(
            matches!(err, ServiceError::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(ScenarioFile::from_yaml("decision: [").is_err());
        assert!(ScenarioFile::from_yaml("scenarios: []").is_err());
    }

    #[test]
    fn test_first_mismatch() {
        let a = OutputRow::new("a", Some("1"));
        let b = OutputRow::new("b", None);
        assert_eq!(first_mismatch(&[a.clone(), b.clone()], &[a.clone(), b.clone()]), None);
        assert_eq!(first_mismatch(&[a.clone(), b.clone()], &[b.clone(), a.clone()]), Some(0));
        assert_eq!(first_mismatch(&[a.clone(), b.clone()], &[a.clone()]), Some(1));
        assert_eq!(first_mismatch(&[], &[a]), Some(0));
    }

    #[test]
    fn test_mismatch_summary() {
        let report = ScenarioReport {
            name: "s".into(),
            passed: false,
            expected: vec![OutputRow::new("region", Some("1"))],
            actual: vec![],
            first_mismatch: Some(0),
        };
        assert_eq!(
            report.mismatch_summary().unwrap(),
            r#"row 0: expected region: "1", got <missing>"#
        );
    }
}
