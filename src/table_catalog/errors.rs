use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Field '{path}' cannot be selected through a join on '{table}'")]
    UnsupportedJoinField { table: String, path: String },
}
