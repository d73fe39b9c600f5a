use thiserror::Error;

use crate::validation::DomainIssue;

pub type Result<T> = std::result::Result<T, SelqError>;

#[derive(Debug, Error)]
pub enum SelqError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("domain validation failed: {}", format_issues(.0))]
    Validation(Vec<DomainIssue>),
    #[error("field resolution error: {0}")]
    Field(#[from] FieldError),
    #[error("parameterized join error: {0}")]
    JoinParameter(#[from] JoinParameterError),
    #[error("join configuration error: {0}")]
    JoinConfig(#[from] JoinConfigError),
    #[error("set operation schema error: {0}")]
    SetOperation(#[from] SetOpError),
    #[error("Invalid Table: {0}")]
    InvalidIdentifier(String),
    #[error("query selects no columns")]
    EmptySelect,
    #[error("execution error: {0}")]
    Execution(String),
    #[error("no results")]
    NoResults,
    #[error("multiple results")]
    MultipleResults,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Field reference resolution failures. Each variant carries the material a
/// caller needs to render a correction prompt.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field {field} not found{}", format_suggestions(suggestions))]
    NotFound {
        field: String,
        suggestions: Vec<String>,
    },
    #[error("field {field} is ambiguous; qualify with one of: {}", options.join(", "))]
    Ambiguous {
        field: String,
        options: Vec<String>,
    },
    #[error("join {join} not found; available joins: {}", available_joins.join(", "))]
    JoinNotFound {
        join: String,
        available_joins: Vec<String>,
    },
    #[error("field {field} not found in join {join}; available fields: {}", available_fields.join(", "))]
    FieldNotFoundInJoin {
        join: String,
        field: String,
        available_fields: Vec<String>,
    },
    #[error("invalid field reference {reference}: {reason}")]
    InvalidFormat { reference: String, reason: String },
}

#[derive(Debug, Error)]
pub enum JoinParameterError {
    #[error("join {join} requires parameter {parameter}")]
    MissingRequiredParameter { join: String, parameter: String },
    #[error("join {join} parameter {parameter} expects {expected}, got {got}")]
    TypeMismatch {
        join: String,
        parameter: String,
        expected: String,
        got: String,
    },
    #[error("join {join} has no parameter at position {position}")]
    UnknownParameter { join: String, position: usize },
}

#[derive(Debug, Error)]
#[error("join {join} ({join_type}) is missing {missing}")]
pub struct JoinConfigError {
    pub join: String,
    pub join_type: String,
    pub missing: String,
}

#[derive(Debug, Error)]
pub enum SetOpError {
    #[error("column count mismatch: left selects {left}, right selects {right}")]
    ColumnCountMismatch { left: usize, right: usize },
    #[error("type mismatch at column {position}: {left} is not compatible with {right}")]
    TypeMismatch {
        position: usize,
        left: String,
        right: String,
    },
    #[error("{side} side of the set operation selects no columns")]
    EmptySelection { side: &'static str },
}

fn format_issues(issues: &[DomainIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!("; did you mean one of: {}", suggestions.join(", "))
    }
}
