//! CLI subcommands.

pub mod batch;
pub mod config;
pub mod grammars;
pub mod parse;
