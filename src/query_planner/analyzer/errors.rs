use std::fmt::Display;

use thiserror::Error;

use crate::table_catalog::errors::CatalogError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Pass {
    LazyTableResolver,
    QueryGuards,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::LazyTableResolver => write!(f, "LazyTableResolver"),
            Pass::QueryGuards => write!(f, "QueryGuards"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalyzerError {
    #[error("Unable to resolve field '{field}' of '{path}' on table '{table}'")]
    UnresolvableField {
        path: String,
        field: String,
        table: String,
    },

    #[error("'{path}' is a table, select one of its fields instead")]
    LazyTableNotSelectable { path: String },

    #[error("'{path}' continues past column '{column}', which is not a JSON column")]
    PropertyPathOnColumn { path: String, column: String },

    #[error(
        "Join alias '{alias}' is generated by both '{existing}' and '{requested}'. This is an internal resolver error."
    )]
    AliasCollision {
        alias: String,
        existing: String,
        requested: String,
    },

    #[error(" {pass}: Query has no FROM table")]
    MissingFromTable { pass: Pass },

    #[error(" {pass}: Explicit joins are not supported in the input query")]
    ExplicitJoinsUnsupported { pass: Pass },

    #[error(" {pass}: Input query contains a {node}; only fields and constants are accepted")]
    ResolvedNodeInInput { pass: Pass, node: String },

    #[error(" {pass}: Field path '{path}' expands into a traversal cycle")]
    TraversalCycle { pass: Pass, path: String },

    #[error("Catalog: {0}")]
    Catalog(#[from] CatalogError),
}
