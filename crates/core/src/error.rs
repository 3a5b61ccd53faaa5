use std::path::PathBuf;

use thiserror::Error;

/// Raised by a template engine when a source document cannot be compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parsing error in {}: {message}", source_path.display())]
pub struct ParseError {
    pub source_path: PathBuf,
    pub message: String,
}

impl ParseError {
    pub fn new(source_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            message: message.into(),
        }
    }
}

/// Raised by a template engine when rendering against data fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Evaluation error: {message}")]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing_value(expression: &str) -> Self {
        Self::new(format!("Value is missing for expression: {}", expression))
    }
}
