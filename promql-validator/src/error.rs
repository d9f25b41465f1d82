//! Error types for extraction, parsing and validation.

use thiserror::Error;

/// Grammar-level parse failure with the byte position of the offending token.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("syntax error at position {position}: {message}")]
pub struct ParseError {
    /// Byte offset into the candidate string.
    pub position: usize,
    /// Human-readable description of what was expected.
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Validation failure for a generated candidate.
///
/// The rendered message of each variant is exactly what gets fed back into
/// the next repair prompt, so messages are written for the model to act on:
/// concrete names, all of them, not just the first.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// No candidate-shaped substring was found in the raw model output.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The candidate does not parse as PromQL.
    #[error("{0}")]
    Syntax(#[from] ParseError),

    /// Referenced metric or label names missing from the schema. All
    /// unresolved names are listed so one repair round can fix them all.
    #[error("schema error: unknown identifiers: {}", unknown_identifiers.join(", "))]
    Schema { unknown_identifiers: Vec<String> },

    /// The candidate parses and resolves but is structurally unsound.
    #[error("semantic error: {details}")]
    Semantic { details: String },
}
