use super::feel::{Scope, compare_values, values_equal};
use super::model::{Aggregation, Decision, DecisionLogic, DecisionRule, DecisionTable, HitPolicy};
use crate::errors::ServiceError;
use crate::types::{DecisionTableResult, RuleResult, Variables};
use serde_json::Value;
use std::cmp::Ordering;

/// Stateless decision table evaluator.
#[derive(Debug, Clone, Default)]
pub struct DecisionEvaluator;

impl DecisionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate_decision(
        &self,
        decision: &Decision,
        variables: &Variables,
    ) -> Result<DecisionTableResult, ServiceError> {
        let table = match &decision.logic {
            DecisionLogic::Table(table) => table,
            DecisionLogic::Unsupported(kind) => {
                return Err(ServiceError::EvaluationFailure(format!(
                    "Decision '{}' uses unsupported decision logic '{kind}'",
                    decision.id
                )));
            }
        };

        let (rules, aggregate) = self.evaluate_table(table, variables)?;
        tracing::debug!(
            decision = %decision.id,
            hit_policy = %table.hit_policy,
            results = rules.len(),
            "decision table evaluated"
        );

        Ok(DecisionTableResult {
            decision_id: decision.id.clone(),
            digest: None,
            rules,
            aggregate,
        })
    }

    pub fn evaluate_table(
        &self,
        table: &DecisionTable,
        variables: &Variables,
    ) -> Result<(Vec<RuleResult>, Option<Value>), ServiceError> {
        let input_values = self.evaluate_inputs(table, variables)?;

        let mut matched = Vec::new();
        for (index, rule) in table.rules.iter().enumerate() {
            if self.rule_matches(table, rule, &input_values, variables)? {
                tracing::trace!(rule = %rule.display_id(index), "rule matched");
                matched.push((index, rule));
            }
        }

        let mut results = matched
            .iter()
            .map(|(index, rule)| self.evaluate_outputs(table, *index, rule, variables))
            .collect::<Result<Vec<_>, _>>()?;

        match table.hit_policy {
            HitPolicy::Unique if results.len() > 1 => Err(ServiceError::EvaluationFailure(format!(
                "Hit policy UNIQUE allows a single match, but rules {} matched",
                matched_ids(&matched)
            ))),
            HitPolicy::Unique | HitPolicy::RuleOrder | HitPolicy::Collect(None) => {
                Ok((results, None))
            }
            HitPolicy::First => {
                results.truncate(1);
                Ok((results, None))
            }
            HitPolicy::Any => {
                if let Some(first) = results.first() {
                    if let Some(other) = results.iter().find(|r| !same_outputs(r, first)) {
                        return Err(ServiceError::EvaluationFailure(format!(
                            "Hit policy ANY requires matching rules to agree, but {} and {} differ",
                            first.rule_id.as_deref().unwrap_or("?"),
                            other.rule_id.as_deref().unwrap_or("?")
                        )));
                    }
                }
                results.truncate(1);
                Ok((results, None))
            }
            HitPolicy::Priority => {
                sort_by_output_priority(table, &mut results);
                results.truncate(1);
                Ok((results, None))
            }
            HitPolicy::OutputOrder => {
                sort_by_output_priority(table, &mut results);
                Ok((results, None))
            }
            HitPolicy::Collect(Some(aggregation)) => {
                let aggregate = aggregate(aggregation, &results)?;
                Ok((results, Some(aggregate)))
            }
        }
    }

    fn evaluate_inputs(
        &self,
        table: &DecisionTable,
        variables: &Variables,
    ) -> Result<Vec<Value>, ServiceError> {
        let scope = Scope::new(variables);
        table
            .inputs
            .iter()
            .map(|input| {
                let value = input.expression.evaluate(&scope)?;
                match &input.type_ref {
                    Some(type_ref) => type_ref.coerce(value).map_err(|e| {
                        ServiceError::EvaluationFailure(format!(
                            "Input '{}': {e}",
                            input.label.as_deref().unwrap_or(&input.expression.source)
                        ))
                    }),
                    None => Ok(value),
                }
            })
            .collect()
    }

    fn rule_matches(
        &self,
        table: &DecisionTable,
        rule: &DecisionRule,
        input_values: &[Value],
        variables: &Variables,
    ) -> Result<bool, ServiceError> {
        for ((input, entry), value) in table.inputs.iter().zip(&rule.input_entries).zip(input_values)
        {
            let scope = Scope::with_input(variables, &input.input_variable, value);
            if !entry.matches(&scope)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn evaluate_outputs(
        &self,
        table: &DecisionTable,
        index: usize,
        rule: &DecisionRule,
        variables: &Variables,
    ) -> Result<RuleResult, ServiceError> {
        let scope = Scope::new(variables);
        let mut outputs = Vec::with_capacity(table.outputs.len());
        for (clause, entry) in table.outputs.iter().zip(&rule.output_entries) {
            let value = match entry {
                Some(expression) => expression.evaluate(&scope)?,
                None => Value::Null,
            };
            let value = match &clause.type_ref {
                Some(type_ref) => type_ref.coerce(value).map_err(|e| {
                    ServiceError::EvaluationFailure(format!(
                        "Rule '{}', output '{}': {e}",
                        rule.display_id(index),
                        clause.name
                    ))
                })?,
                None => value,
            };
            outputs.push((clause.name.clone(), value));
        }
        Ok(RuleResult {
            rule_id: Some(rule.display_id(index)),
            outputs,
        })
    }
}

fn matched_ids(matched: &[(usize, &DecisionRule)]) -> String {
    matched
        .iter()
        .map(|(index, rule)| rule.display_id(*index))
        .collect::<Vec<_>>()
        .join(", ")
}

fn same_outputs(left: &RuleResult, right: &RuleResult) -> bool {
    left.outputs.len() == right.outputs.len()
        && left
            .outputs
            .iter()
            .zip(&right.outputs)
            .all(|((_, a), (_, b))| values_equal(a, b))
}

// Stable sort, so rules with equal priority keep authored order
fn sort_by_output_priority(table: &DecisionTable, results: &mut [RuleResult]) {
    results.sort_by_key(|result| {
        table
            .outputs
            .iter()
            .zip(&result.outputs)
            .map(|(clause, (_, value))| clause.priority_of(value))
            .collect::<Vec<_>>()
    });
}

fn aggregate(aggregation: Aggregation, results: &[RuleResult]) -> Result<Value, ServiceError> {
    let values: Vec<&Value> = results
        .iter()
        .filter_map(RuleResult::single_value)
        .filter(|value| !value.is_null())
        .collect();

    if aggregation == Aggregation::Count {
        return Ok(Value::from(values.len()));
    }
    if values.is_empty() {
        return Ok(Value::Null);
    }

    match aggregation {
        Aggregation::Sum => {
            let mut sum = 0.0;
            for value in &values {
                sum += value.as_f64().ok_or_else(|| not_a_number("SUM", value))?;
            }
            Ok(super::feel::number_value(sum))
        }
        Aggregation::Min | Aggregation::Max => {
            let wanted = if aggregation == Aggregation::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best = values[0];
            for value in &values[1..] {
                match compare_values(value, best) {
                    Some(ordering) if ordering == wanted => best = *value,
                    Some(_) => {}
                    None => return Err(not_a_number(&format!("{aggregation:?}"), value)),
                }
            }
            Ok(best.clone())
        }
        Aggregation::Count => Ok(Value::from(values.len())),
    }
}

fn not_a_number(aggregation: &str, value: &Value) -> ServiceError {
    ServiceError::EvaluationFailure(format!(
        "COLLECT {aggregation} cannot aggregate non-comparable value {value}"
    ))
}
