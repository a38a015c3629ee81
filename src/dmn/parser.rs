//! # DMN XML parsing
//!
//! Reads DMN 1.1 - 1.3 documents into the [`model`](super::model) types.
//! Elements are matched by local name so every DMN namespace version is
//! accepted. All FEEL cells are compiled here, so a loaded decision can be
//! evaluated without further parse errors.

use super::feel::{DEFAULT_INPUT_VARIABLE, FeelExpression, Scope, UnaryTests};
use super::model::{
    Decision, DecisionLogic, DecisionRule, DecisionTable, Definitions, HitPolicy, InputClause,
    OutputClause, TypeRef,
};
use crate::errors::ServiceError;
use crate::types::Variables;
use roxmltree::{Document, Node};
use serde_json::Value;

pub fn parse_definitions(xml: &str) -> Result<Definitions, ServiceError> {
    let document = Document::parse(xml)?;
    let root = document.root_element();
    if root.tag_name().name() != "definitions" {
        return Err(ServiceError::ParserError(format!(
            "Expected <definitions> root element, found <{}>",
            root.tag_name().name()
        )));
    }

    let decisions = children(root, "decision")
        .map(parse_decision_element)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Definitions {
        id: root.attribute("id").map(str::to_string),
        name: root.attribute("name").map(str::to_string),
        namespace: root.attribute("namespace").map(str::to_string),
        decisions,
    })
}

/// Parse `xml` and return the decision whose id is `decision_id`.
pub fn parse_decision(decision_id: &str, xml: &str) -> Result<Decision, ServiceError> {
    let definitions = parse_definitions(xml)?;
    definitions
        .decisions
        .into_iter()
        .find(|decision| decision.id == decision_id)
        .ok_or_else(|| ServiceError::DecisionNotFound(decision_id.to_string()))
}

fn parse_decision_element(node: Node<'_, '_>) -> Result<Decision, ServiceError> {
    let id = node
        .attribute("id")
        .ok_or_else(|| ServiceError::ParserError("Decision is missing an id".to_string()))?
        .to_string();

    let logic = match child(node, "decisionTable") {
        Some(table) => DecisionLogic::Table(
            parse_decision_table(table).map_err(|e| with_context(&format!("Decision '{id}'"), e))?,
        ),
        None => {
            let kind = node
                .children()
                .filter(Node::is_element)
                .map(|n| n.tag_name().name())
                .find(|name| !matches!(*name, "description" | "extensionElements" | "variable"
                    | "informationRequirement" | "knowledgeRequirement" | "authorityRequirement"))
                .unwrap_or("none");
            DecisionLogic::Unsupported(kind.to_string())
        }
    };

    Ok(Decision {
        id,
        name: node.attribute("name").map(str::to_string),
        logic,
    })
}

fn parse_decision_table(node: Node<'_, '_>) -> Result<DecisionTable, ServiceError> {
    let hit_policy = HitPolicy::parse(node.attribute("hitPolicy"), node.attribute("aggregation"))?;

    let inputs = children(node, "input")
        .map(parse_input_clause)
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = children(node, "output")
        .enumerate()
        .map(|(index, output)| parse_output_clause(output, index))
        .collect::<Result<Vec<_>, _>>()?;

    if outputs.is_empty() {
        return Err(ServiceError::ParserError(
            "Decision table has no outputs".to_string(),
        ));
    }
    if outputs.len() > 1 && outputs.iter().any(|o| o.name.is_empty()) {
        return Err(ServiceError::ParserError(
            "Every output of a multi-output table needs a name".to_string(),
        ));
    }
    if matches!(hit_policy, HitPolicy::Collect(Some(_))) && outputs.len() > 1 {
        return Err(ServiceError::ParserError(format!(
            "{hit_policy} requires a single output, found {}",
            outputs.len()
        )));
    }

    let rules = children(node, "rule")
        .enumerate()
        .map(|(index, rule)| parse_rule(rule, index, inputs.len(), outputs.len()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecisionTable {
        id: node.attribute("id").map(str::to_string),
        hit_policy,
        inputs,
        outputs,
        rules,
    })
}

fn parse_input_clause(node: Node<'_, '_>) -> Result<InputClause, ServiceError> {
    let expression_node = child(node, "inputExpression").ok_or_else(|| {
        ServiceError::ParserError(format!(
            "Input '{}' has no inputExpression",
            node.attribute("id").unwrap_or("?")
        ))
    })?;

    let input_variable = node
        .attributes()
        .find(|attribute| attribute.name() == "inputVariable")
        .map(|attribute| attribute.value().to_string())
        .unwrap_or_else(|| DEFAULT_INPUT_VARIABLE.to_string());

    Ok(InputClause {
        id: node.attribute("id").map(str::to_string),
        label: node.attribute("label").map(str::to_string),
        expression: FeelExpression::parse(&text_of(expression_node))?,
        type_ref: parse_type_ref(expression_node.attribute("typeRef"))?,
        input_variable,
    })
}

fn parse_output_clause(node: Node<'_, '_>, index: usize) -> Result<OutputClause, ServiceError> {
    let name = node
        .attribute("name")
        .or_else(|| node.attribute("label"))
        .map(str::to_string)
        .unwrap_or_else(|| if index == 0 { String::new() } else { format!("output{}", index + 1) });

    let output_values = match child(node, "outputValues") {
        Some(values) => Some(parse_output_values(&text_of(values))?),
        None => None,
    };

    Ok(OutputClause {
        id: node.attribute("id").map(str::to_string),
        name,
        label: node.attribute("label").map(str::to_string),
        type_ref: parse_type_ref(node.attribute("typeRef"))?,
        output_values,
    })
}

/// `"high","medium","low"` -> `["high", "medium", "low"]`
fn parse_output_values(text: &str) -> Result<Vec<Value>, ServiceError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list = FeelExpression::parse(&format!("[{text}]"))?;
    let variables = Variables::new();
    match list.evaluate(&Scope::new(&variables))? {
        Value::Array(values) => Ok(values),
        other => Err(ServiceError::ParserError(format!(
            "Output values must be a list of literals, got {other}"
        ))),
    }
}

fn parse_rule(
    node: Node<'_, '_>,
    index: usize,
    input_count: usize,
    output_count: usize,
) -> Result<DecisionRule, ServiceError> {
    let rule_id = node
        .attribute("id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", index + 1));
    let in_rule = |e: ServiceError| with_context(&format!("Rule '{rule_id}'"), e);

    let input_entries = children(node, "inputEntry")
        .map(|entry| UnaryTests::parse(&text_of(entry)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(in_rule)?;
    let output_entries = children(node, "outputEntry")
        .map(|entry| {
            let text = text_of(entry);
            if text.trim().is_empty() {
                Ok(None)
            } else {
                FeelExpression::parse(&text).map(Some)
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(in_rule)?;

    if input_entries.len() != input_count {
        return Err(ServiceError::ParserError(format!(
            "Rule '{rule_id}' has {} input entries, table has {input_count} inputs",
            input_entries.len()
        )));
    }
    if output_entries.len() != output_count {
        return Err(ServiceError::ParserError(format!(
            "Rule '{rule_id}' has {} output entries, table has {output_count} outputs",
            output_entries.len()
        )));
    }

    Ok(DecisionRule {
        id: node.attribute("id").map(str::to_string),
        description: child(node, "description").map(text_of),
        input_entries,
        output_entries,
    })
}

fn with_context(context: &str, err: ServiceError) -> ServiceError {
    match err {
        ServiceError::ParserError(msg) => ServiceError::ParserError(format!("{context}: {msg}")),
        other => ServiceError::ParserError(format!("{context}: {other}")),
    }
}

fn parse_type_ref(type_ref: Option<&str>) -> Result<Option<TypeRef>, ServiceError> {
    type_ref
        .filter(|t| !t.trim().is_empty())
        .map(str::parse)
        .transpose()
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// Text of the `<text>` child, or of the element itself when it has none
fn text_of(node: Node<'_, '_>) -> String {
    let source = child(node, "text").unwrap_or(node);
    source
        .descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}
