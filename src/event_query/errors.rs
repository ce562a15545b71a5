use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    clickhouse_query_generator::errors::PrinterError, table_catalog::errors::CatalogError,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EventQueryError {
    #[error("Invalid property group: {0}")]
    InvalidPropertyGroup(String),

    #[error("Sampling factor must be in (0, 1], got {0}")]
    InvalidSamplingFactor(f64),

    #[error("Action {0} does not exist")]
    UnknownAction(i64),

    #[error("Date range starts after it ends ({from} > {to})")]
    InvalidDateRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("Group type index {0} is out of range (0-4)")]
    InvalidGroupTypeIndex(u8),

    #[error("Printer: {0}")]
    Printer(#[from] PrinterError),

    #[error("Catalog: {0}")]
    Catalog(#[from] CatalogError),
}

impl EventQueryError {
    /// Invalid property group error naming the offending filter.
    pub fn invalid_filter(key: &str, reason: impl Into<String>) -> Self {
        EventQueryError::InvalidPropertyGroup(format!("filter '{}': {}", key, reason.into()))
    }
}
