use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A request field is missing or shorter than its minimum length.
/// Recoverable by asking the user again; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request: {}", join(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

fn join(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The model call failed or its response did not match the expected shape.
/// There is never a partial result.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("build LLM: {0}")]
    Build(String),

    #[error("chat: {0}")]
    Transport(String),

    #[error("model did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("LLM returned no text")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response is missing required field `{0}`")]
    MissingField(String),

    #[error("response field `{0}` is empty")]
    EmptyField(String),
}
