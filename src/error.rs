//! Error types for the PDF scrambler

use std::path::PathBuf;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the remapping engine.
///
/// Only [`ScrambleError::ConsistencyViolation`] is ever returned from
/// [`crate::scramble`]; the other kinds are collected in the report and
/// surfaced through [`crate::ScrambleReport::issues`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrambleError {
    /// The font has no encoding structure that can be rewritten at PDF level
    #[error("font {font} is not remappable: {reason}")]
    UnsupportedFont { font: String, reason: String },

    /// Some used codes had no derangement partner and were left in place
    #[error("font {font}: {codes} code(s) left unscrambled, codespace saturated")]
    CodespaceSaturated { font: String, codes: usize },

    /// A content stream could not be tokenized and was left untouched
    #[error("stream {stream} skipped at byte {offset}: {reason}")]
    StreamTokenization {
        stream: String,
        offset: usize,
        reason: String,
    },

    /// Post-patch visual identity could not be verified
    #[error("consistency violation in {subject}: {detail}")]
    ConsistencyViolation { subject: String, detail: String },
}

impl ScrambleError {
    /// Whether this error aborts the whole document transformation
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScrambleError::ConsistencyViolation { .. })
    }
}

/// Main error type for the file-level API
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Report or mapping file (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scrambling was aborted
    #[error(transparent)]
    Scramble(#[from] ScrambleError),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// Invalid font selection pattern
    #[error("Invalid font pattern: {0}")]
    InvalidPattern(String),

    /// Invalid character selection expression
    #[error("Invalid selection expression: {0}")]
    InvalidSelector(String),

    /// General error
    #[error("{0}")]
    General(String),
}
