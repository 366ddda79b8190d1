//! Error types for the finstmt-core library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the finstmt library.
#[derive(Error, Debug)]
pub enum FinstmtError {
    /// The document could not be turned into text.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Statement field extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// A grammar or category rule failed to compile.
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FinstmtError {
    /// Classify this error for batch outcomes and diagnostics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FinstmtError::Extraction(ExtractionError::MandatoryFieldMissing(_)) => {
                ErrorKind::MandatoryFieldMissing
            }
            FinstmtError::Grammar(_) | FinstmtError::Config(_) => ErrorKind::WorkerFailed,
            FinstmtError::Document(_) | FinstmtError::Io(_) => ErrorKind::DocumentUnreadable,
        }
    }
}

/// Errors raised by document readers.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The identifier does not resolve to a document.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Failed to open/parse the document.
    #[error("failed to parse document: {0}")]
    Parse(String),

    /// Failed to extract text from the document.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The document is encrypted and the empty password did not open it.
    #[error("document is encrypted")]
    Encrypted,

    /// The document has no pages.
    #[error("document has no pages")]
    NoPages,

    /// No reader handles this file type.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Underlying I/O failure while reading the document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort extraction of a single statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// A field required by the output schema is missing.
    #[error("missing required field: {0}")]
    MandatoryFieldMissing(String),
}

/// Errors raised while compiling grammars or category rules.
#[derive(Error, Debug)]
pub enum GrammarError {
    /// A pattern failed to compile.
    #[error("invalid pattern '{name}' in {owner}: {source}")]
    InvalidPattern {
        owner: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    /// A line template has no amount or date slot.
    #[error("line template for {0} needs at least a date and an amount slot")]
    IncompleteTemplate(String),

    /// A period matcher is missing its named groups.
    #[error("period matcher '{name}' in {owner} must define `start` and `end` groups")]
    PeriodGroups { owner: String, name: String },
}

/// Classification of everything that can go wrong (or degrade) for a document.
///
/// `DocumentUnreadable` and `MandatoryFieldMissing` abort a document.
/// `NoMatchingInstitution` and `TransactionLineUnparsed` only lower
/// confidence and appear in diagnostics. `TimeoutExceeded` and `WorkerFailed`
/// are produced by the batch orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DocumentUnreadable,
    MandatoryFieldMissing,
    NoMatchingInstitution,
    TransactionLineUnparsed,
    TimeoutExceeded,
    WorkerFailed,
}

impl ErrorKind {
    /// Whether this kind stops the pipeline for its document.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ErrorKind::NoMatchingInstitution | ErrorKind::TransactionLineUnparsed
        )
    }
}

/// Result type for the finstmt library.
pub type Result<T> = std::result::Result<T, FinstmtError>;
