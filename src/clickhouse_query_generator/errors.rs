use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PrinterError {
    #[error("Field '{0}' was not resolved before printing")]
    UnresolvedField(String),

    #[error("Parameter '{name}' bound twice with different values ({existing} vs {new})")]
    ParamConflict {
        name: String,
        existing: Value,
        new: Value,
    },

    #[error("Invalid ClickHouse function name: {0}")]
    InvalidFunctionName(String),

    #[error("SELECT list is empty")]
    EmptySelect,
}
