use thiserror::Error;

use crate::{
    clickhouse_query_generator::errors::PrinterError, config::ConfigError,
    event_query::errors::EventQueryError, query_planner::analyzer::errors::AnalyzerError,
};

/// Any failure of a compile entry point.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Printer error: {0}")]
    Printer(#[from] PrinterError),

    #[error("Event query error: {0}")]
    EventQuery(#[from] EventQueryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
