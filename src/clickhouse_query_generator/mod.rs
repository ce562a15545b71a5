//! ClickHouse printer: resolved AST to SQL text plus bound parameters.

use serde::Serialize;

use crate::ast::SelectQuery;

mod common;
pub mod errors;
pub mod params;
mod to_sql;

pub use common::{escape_identifier, escape_string};
pub use errors::PrinterError;
pub use params::ParamMap;
pub use to_sql::ClickHousePrinter;

/// SQL ready for the database client, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: ParamMap,
}

/// Print `query`, binding its literals into `params`.
pub fn print_ast(query: &SelectQuery, params: &mut ParamMap) -> Result<String, PrinterError> {
    ClickHousePrinter::new(params).print_select(query)
}

/// Print `query` with a fresh parameter map.
pub fn generate_sql(query: &SelectQuery) -> Result<CompiledQuery, PrinterError> {
    let mut params = ParamMap::new();
    let sql = print_ast(query, &mut params)?;
    Ok(CompiledQuery { sql, params })
}
