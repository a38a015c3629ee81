use super::feel::{FeelExpression, UnaryTests};
use crate::errors::ServiceError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Root of a DMN resource.
#[derive(Debug, Clone)]
pub struct Definitions {
    pub id: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub decisions: Vec<Decision>,
}

impl Definitions {
    pub fn decision(&self, id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|decision| decision.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub id: String,
    pub name: Option<String>,
    pub logic: DecisionLogic,
}

#[derive(Debug, Clone)]
pub enum DecisionLogic {
    Table(DecisionTable),
    /// Decision logic this engine does not evaluate, by element name
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct DecisionTable {
    pub id: Option<String>,
    pub hit_policy: HitPolicy,
    pub inputs: Vec<InputClause>,
    pub outputs: Vec<OutputClause>,
    pub rules: Vec<DecisionRule>,
}

#[derive(Debug, Clone)]
pub struct InputClause {
    pub id: Option<String>,
    pub label: Option<String>,
    pub expression: FeelExpression,
    pub type_ref: Option<TypeRef>,
    /// Name the evaluated input is bound to inside its entries
    pub input_variable: String,
}

#[derive(Debug, Clone)]
pub struct OutputClause {
    pub id: Option<String>,
    pub name: String,
    pub label: Option<String>,
    pub type_ref: Option<TypeRef>,
    /// Allowed values in priority order, used by PRIORITY and OUTPUT ORDER
    pub output_values: Option<Vec<Value>>,
}

impl OutputClause {
    /// Position of `value` in the priority list; unlisted values sort last
    pub fn priority_of(&self, value: &Value) -> usize {
        match &self.output_values {
            Some(values) => values
                .iter()
                .position(|candidate| super::feel::values_equal(candidate, value))
                .unwrap_or(values.len()),
            None => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionRule {
    pub id: Option<String>,
    pub description: Option<String>,
    pub input_entries: Vec<UnaryTests>,
    /// `None` for an empty output cell
    pub output_entries: Vec<Option<FeelExpression>>,
}

impl DecisionRule {
    pub fn display_id(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("#{}", index + 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Aggregation {
    Sum,
    Min,
    Max,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HitPolicy {
    Unique,
    First,
    Priority,
    Any,
    Collect(Option<Aggregation>),
    RuleOrder,
    OutputOrder,
}

impl HitPolicy {
    pub fn parse(hit_policy: Option<&str>, aggregation: Option<&str>) -> Result<Self, ServiceError> {
        let policy = match hit_policy.map(str::trim).unwrap_or("UNIQUE") {
            "UNIQUE" => HitPolicy::Unique,
            "FIRST" => HitPolicy::First,
            "PRIORITY" => HitPolicy::Priority,
            "ANY" => HitPolicy::Any,
            "COLLECT" => HitPolicy::Collect(None),
            "RULE ORDER" => HitPolicy::RuleOrder,
            "OUTPUT ORDER" => HitPolicy::OutputOrder,
            other => {
                return Err(ServiceError::ParserError(format!(
                    "Unknown hit policy '{other}'"
                )));
            }
        };

        match (policy, aggregation.map(str::trim)) {
            (_, None) => Ok(policy),
            (HitPolicy::Collect(_), Some(aggregation)) => {
                let aggregation = match aggregation {
                    "SUM" => Aggregation::Sum,
                    "MIN" => Aggregation::Min,
                    "MAX" => Aggregation::Max,
                    "COUNT" => Aggregation::Count,
                    other => {
                        return Err(ServiceError::ParserError(format!(
                            "Unknown aggregation '{other}'"
                        )));
                    }
                };
                Ok(HitPolicy::Collect(Some(aggregation)))
            }
            (policy, Some(aggregation)) => Err(ServiceError::ParserError(format!(
                "Aggregation '{aggregation}' is only allowed with COLLECT, not {policy}"
            ))),
        }
    }
}

impl fmt::Display for HitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitPolicy::Unique => f.write_str("UNIQUE"),
            HitPolicy::First => f.write_str("FIRST"),
            HitPolicy::Priority => f.write_str("PRIORITY"),
            HitPolicy::Any => f.write_str("ANY"),
            HitPolicy::Collect(None) => f.write_str("COLLECT"),
            HitPolicy::Collect(Some(aggregation)) => write!(f, "COLLECT {aggregation:?}"),
            HitPolicy::RuleOrder => f.write_str("RULE ORDER"),
            HitPolicy::OutputOrder => f.write_str("OUTPUT ORDER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    /// Any other declared type; values pass through unchanged
    Other(String),
}

impl FromStr for TypeRef {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let type_ref = match s.trim() {
            "string" => TypeRef::String,
            "integer" => TypeRef::Integer,
            "long" => TypeRef::Long,
            "double" | "number" => TypeRef::Double,
            "boolean" => TypeRef::Boolean,
            "" => {
                return Err(ServiceError::ParserError("Empty typeRef".to_string()));
            }
            other => TypeRef::Other(other.to_string()),
        };
        Ok(type_ref)
    }
}

impl TypeRef {
    /// Convert `value` to this type. `null` is valid for every type.
    pub fn coerce(&self, value: Value) -> Result<Value, ServiceError> {
        let coerced = match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (TypeRef::Other(_), value) => Some(value),
            (TypeRef::String, Value::String(s)) => Some(Value::String(s)),
            (TypeRef::String, value @ (Value::Number(_) | Value::Bool(_))) => {
                Some(Value::String(value.to_string()))
            }
            (TypeRef::Integer | TypeRef::Long, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(super::feel::exact_i64))
                .map(Value::from),
            (TypeRef::Integer | TypeRef::Long, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(Value::from)
            }
            (TypeRef::Double, Value::Number(n)) => Some(Value::Number(n)),
            (TypeRef::Double, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            (TypeRef::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (TypeRef::Boolean, Value::String(s)) => match s.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (type_ref, value) => {
                return Err(type_mismatch(type_ref, &value));
            }
        };
        coerced.ok_or_else(|| {
            ServiceError::EvaluationFailure(format!("Value cannot be converted to {self:?}"))
        })
    }
}

fn type_mismatch(type_ref: &TypeRef, value: &Value) -> ServiceError {
    ServiceError::EvaluationFailure(format!(
        "Value {value} cannot be converted to {type_ref:?}"
    ))
}
