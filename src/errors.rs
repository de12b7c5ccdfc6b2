use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural mismatch between a model value and a declared shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("schema violation in {shape}: field `{field}` {reason}")]
pub struct SchemaViolation {
    pub shape: &'static str,
    pub field: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model backend unavailable: {0}")]
    Unavailable(String),
    #[error("model returned empty output")]
    EmptyOutput,
    #[error("model output malformed: {reason}")]
    Malformed { reason: String, raw: String },
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] TemplateError),
}

impl ModelError {
    pub fn unavailable(e: impl std::fmt::Display) -> Self {
        ModelError::Unavailable(e.to_string())
    }

    /// Raw model text carried by errors that have one.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            ModelError::Malformed { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Unavailable(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template syntax error at byte {at}: {reason}")]
    Syntax { at: usize, reason: String },
    #[error("missing template variable `{0}`")]
    MissingVariable(String),
    #[error("template variable `{name}` must be {expected}")]
    WrongKind { name: String, expected: &'static str },
}

/// The only error shape handed across the orchestrator boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{error}")]
pub struct BoundaryError {
    pub error: String,
}

impl BoundaryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}
