//! Data models for statement extraction.

pub mod config;
pub mod statement;

pub use config::EngineConfig;
pub use statement::{
    AccountInfo, AccountType, Balance, ConfidenceMap, Period, StatementResult, Transaction,
};
