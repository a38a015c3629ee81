//! # Error Types
//!
//! Error handling for DMN loading and evaluation.
//! Every error is fatal to the evaluation that raised it and maps onto one
//! of two caller-facing kinds, see [`ErrorKind`].

use serde::Serialize;
use std::fmt;

/// Caller-facing classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The named rule definition (or the decision inside it) does not exist
    ResourceNotFound,
    /// The definition was malformed, unreadable, or failed while evaluating
    EvaluationFailure,
}

/// Error types that can occur while loading, parsing or evaluating decisions.
#[derive(Debug)]
pub enum ServiceError {
    /// No resource directory holds the named definition
    ResourceNotFound(String),
    /// The definition file exists but has no decision with this id
    DecisionNotFound(String),
    /// Error parsing DMN structure or FEEL expressions
    ParserError(String),
    /// Runtime failure while evaluating a decision table
    EvaluationFailure(String),
    /// I/O error reading resources or fixtures
    Io(std::io::Error),
    /// Malformed XML in a DMN resource
    Xml(roxmltree::Error),
    /// Error walking resource directories
    WalkDir(walkdir::Error),
    /// Error parsing YAML scenario fixtures
    SerdeYaml(serde_yaml::Error),
    /// Error parsing JSON variable files
    SerdeJson(serde_json::Error),
    /// Regular expression compilation error inside `matches()`
    Regex(regex::Error),
    /// Glob pattern compilation error in resource listing
    Glob(globset::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::ResourceNotFound(_) | ServiceError::DecisionNotFound(_) => {
                ErrorKind::ResourceNotFound
            }
            _ => ErrorKind::EvaluationFailure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::ResourceNotFound
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::ResourceNotFound(name) => write!(f, "Resource not found: {name}"),
            ServiceError::DecisionNotFound(id) => write!(f, "Decision not found: {id}"),
            ServiceError::ParserError(msg) => write!(f, "Parser error: {msg}"),
            ServiceError::EvaluationFailure(msg) => write!(f, "Evaluation failure: {msg}"),
            ServiceError::Io(err) => write!(f, "IO error: {err}"),
            ServiceError::Xml(err) => write!(f, "XML parsing error: {err}"),
            ServiceError::WalkDir(err) => write!(f, "Directory traversal error: {err}"),
            ServiceError::SerdeYaml(err) => write!(f, "YAML parsing error: {err}"),
            ServiceError::SerdeJson(err) => write!(f, "JSON parsing error: {err}"),
            ServiceError::Regex(err) => write!(f, "Regex error: {err}"),
            ServiceError::Glob(err) => write!(f, "Glob error: {err}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Io(err) => Some(err),
            ServiceError::Xml(err) => Some(err),
            ServiceError::WalkDir(err) => Some(err),
            ServiceError::SerdeYaml(err) => Some(err),
            ServiceError::SerdeJson(err) => Some(err),
            ServiceError::Regex(err) => Some(err),
            ServiceError::Glob(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(err)
    }
}

impl From<roxmltree::Error> for ServiceError {
    fn from(err: roxmltree::Error) -> Self {
        ServiceError::Xml(err)
    }
}

impl From<walkdir::Error> for ServiceError {
    fn from(err: walkdir::Error) -> Self {
        ServiceError::WalkDir(err)
    }
}

impl From<serde_yaml::Error> for ServiceError {
    fn from(err: serde_yaml::Error) -> Self {
        ServiceError::SerdeYaml(err)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerdeJson(err)
    }
}

impl From<regex::Error> for ServiceError {
    fn from(err: regex::Error) -> Self {
        ServiceError::Regex(err)
    }
}

impl From<globset::Error> for ServiceError {
    fn from(err: globset::Error) -> Self {
        ServiceError::Glob(err)
    }
}
