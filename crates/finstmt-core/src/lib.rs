//! Core library for financial statement extraction.
//!
//! This crate provides:
//! - Institution detection by weighted signature matching
//! - Per-institution field grammars with a generic fallback
//! - Transaction line parsing, categorization and confidence scoring
//! - Batch orchestration with per-document failure isolation
//! - Document sources for PDF and plain-text statements

pub mod batch;
pub mod categorize;
pub mod confidence;
pub mod detect;
pub mod document;
pub mod error;
pub mod extract;
pub mod grammar;
pub mod models;
pub mod pipeline;
pub mod transactions;

pub use batch::{BatchOptions, BatchOrchestrator, BatchOutcome, DocumentFailure, DocumentOutcome};
pub use categorize::Categorizer;
pub use detect::{DetectionResult, InstitutionDetector};
pub use document::{DocumentSource, FileSource, MemorySource};
pub use error::{ErrorKind, FinstmtError, Result};
pub use grammar::{Grammar, GrammarSpec, PatternRegistry};
pub use models::config::EngineConfig;
pub use models::statement::{AccountInfo, AccountType, Balance, ConfidenceMap, Period, StatementResult, Transaction};
pub use pipeline::{Diagnostics, ExtractionResult, StatementExtractor, StatementParser};

#[cfg(feature = "pdf")]
pub use document::PdfTextReader;
