use crate::errors::ServiceError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Domain prefix of the task configuration decision tables
pub const TASK_CONFIGURATION_DMN: &str = "wa-task-configuration";

/// Composite key selecting a rule definition.
///
/// Jurisdiction and case type are stored lower-cased, also when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "DecisionKeyFields")]
pub struct DecisionKey {
    pub domain: String,
    pub jurisdiction: String,
    pub case_type: String,
}

impl DecisionKey {
    pub fn new(
        domain: impl Into<String>,
        jurisdiction: impl AsRef<str>,
        case_type: impl AsRef<str>,
    ) -> Self {
        Self {
            domain: domain.into(),
            jurisdiction: jurisdiction.as_ref().to_lowercase(),
            case_type: case_type.as_ref().to_lowercase(),
        }
    }

    pub fn task_configuration(jurisdiction: impl AsRef<str>, case_type: impl AsRef<str>) -> Self {
        Self::new(TASK_CONFIGURATION_DMN, jurisdiction, case_type)
    }

    /// `<domain>-<jurisdiction>-<case type>`, also the id of the decision in the resource
    pub fn decision_id(&self) -> String {
        format!("{}-{}-{}", self.domain, self.jurisdiction, self.case_type)
    }

    pub fn resource_name(&self) -> String {
        format!("{}.dmn", self.decision_id())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionKeyFields {
    domain: String,
    jurisdiction: String,
    case_type: String,
}

impl From<DecisionKeyFields> for DecisionKey {
    fn from(fields: DecisionKeyFields) -> Self {
        Self::new(fields.domain, fields.jurisdiction, fields.case_type)
    }
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decision_id())
    }
}

/// Input variables for a single evaluation.
///
/// Names are plain strings and may contain dots; `case.data.appealType` is a
/// legal variable name distinct from a `case` variable holding a context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put_value(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Parse a `name=value` assignment. The value is read as JSON when it
    /// parses as JSON and kept as a plain string otherwise.
    pub fn parse_assignment(assignment: &str) -> Result<(String, Value), ServiceError> {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            ServiceError::ParserError(format!(
                "Variable assignment '{assignment}' must have the form name=value"
            ))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::ParserError(format!(
                "Variable assignment '{assignment}' has an empty name"
            )));
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Ok((name.to_string(), value))
    }

    pub fn from_json(json: &str) -> Result<Self, ServiceError> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(ServiceError::ParserError(format!(
                "Variables must be a JSON object, got {other}"
            ))),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One name/value configuration row produced by a task configuration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub name: String,
    pub value: Option<String>,
}

impl OutputRow {
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }
}

impl fmt::Display for OutputRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}: {value:?}", self.name),
            None => write!(f, "{}: null", self.name),
        }
    }
}

/// Outputs of one matched rule, in output clause order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub rule_id: Option<String>,
    pub outputs: Vec<(String, Value)>,
}

impl RuleResult {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, value)| value)
    }

    /// The value of a single-output rule
    pub fn single_value(&self) -> Option<&Value> {
        match self.outputs.as_slice() {
            [(_, value)] => Some(value),
            _ => None,
        }
    }

    pub fn to_output_row(&self) -> Result<OutputRow, ServiceError> {
        let name = match self.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(ServiceError::EvaluationFailure(format!(
                    "Output 'name' must be a string, got {other}"
                )));
            }
            None => {
                return Err(ServiceError::EvaluationFailure(format!(
                    "Rule {} has no 'name' output",
                    self.rule_id.as_deref().unwrap_or("<anonymous>")
                )));
            }
        };
        let value = self.get("value").and_then(render_row_value);
        Ok(OutputRow { name, value })
    }
}

// Serialized as an ordered map of output name to value
impl Serialize for RuleResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.outputs.len()))?;
        for (name, value) in &self.outputs {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn render_row_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Full result of evaluating one decision table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTableResult {
    pub decision_id: String,
    /// `sha256:<hex>` of the resource the decision was parsed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Matched rules, in the order the hit policy produces them
    pub rules: Vec<RuleResult>,
    /// Aggregated value for COLLECT tables with an aggregator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Value>,
}

impl DecisionTableResult {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn first_result(&self) -> Option<&RuleResult> {
        self.rules.first()
    }

    pub fn output_rows(&self) -> Result<Vec<OutputRow>, ServiceError> {
        self.rules.iter().map(RuleResult::to_output_row).collect()
    }
}
