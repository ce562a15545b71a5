//! Lazy join specifications and their materialization into join nodes.

use crate::ast::{ColumnRef, Expr, FromClause, JoinExpr, JoinType, SelectQuery, TableSource};

use super::{
    errors::CatalogError,
    tables::{field_defs, find_field, FieldDef, TableKind},
};

/// Declares that a field is served by joining another table.
///
/// The joined side is always a deduplicating sub-select: one row per
/// `to_field`, every requested column taken at the latest `version_column`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LazyJoin {
    pub join_table: TableKind,
    /// Column on the parent side of the ON clause.
    pub from_field: &'static str,
    /// Key column of the joined sub-select.
    pub to_field: &'static str,
    pub join_type: JoinType,
    pub version_column: &'static str,
    /// Drop rows whose latest version is marked deleted.
    pub exclude_deleted: bool,
    pub group_type_index: Option<u8>,
}

/// A column the joined sub-select has to expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedField {
    /// Column name in the sub-select output.
    pub output: String,
    /// Path relative to the joined table.
    pub path: Vec<String>,
}

impl RequestedField {
    /// Request `path` under its flattened name (`properties.$browser` →
    /// `properties___$browser`).
    pub fn from_path(path: Vec<String>) -> Self {
        RequestedField {
            output: flattened_name(&path),
            path,
        }
    }

    pub fn renamed(output: &str, path: &[&str]) -> Self {
        RequestedField {
            output: output.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Separator used when a field path becomes a single column name.
pub const PATH_SEPARATOR: &str = "___";

pub fn flattened_name(path: &[String]) -> String {
    path.join(PATH_SEPARATOR)
}

/// Inputs the join sub-selects depend on.
#[derive(Debug, Clone)]
pub struct JoinContext {
    /// Right-hand side of the `team_id` filter inside every sub-select.
    pub team_filter: Expr,
}

impl LazyJoin {
    /// Build the join node for this spec.
    ///
    /// `parent_key` is the expression the ON clause matches against the
    /// sub-select key. Requested fields equal to the key are not repeated.
    pub fn materialize(
        &self,
        ctx: &JoinContext,
        alias: &str,
        parent_key: Expr,
        requested: &[RequestedField],
    ) -> Result<JoinExpr, CatalogError> {
        let table = self.join_table.clickhouse_name();
        let version = Expr::column(None, self.version_column);

        let mut select = Vec::with_capacity(requested.len() + 1);
        for field in requested.iter().filter(|f| f.output != self.to_field) {
            let source = self.source_column(&field.path)?;
            select.push(
                Expr::call("argMax", vec![Expr::Column(source), version.clone()])
                    .alias(&field.output),
            );
        }
        select.push(Expr::column(None, self.to_field));

        let mut filters = vec![Expr::equals(
            Expr::column(None, "team_id"),
            ctx.team_filter.clone(),
        )];
        if let Some(index) = self.group_type_index {
            filters.push(Expr::equals(
                Expr::column(None, "group_type_index"),
                Expr::Inline(i64::from(index)),
            ));
        }

        let having = self.exclude_deleted.then(|| {
            Expr::equals(
                Expr::call("argMax", vec![Expr::column(None, "is_deleted"), version.clone()]),
                Expr::Inline(0),
            )
        });

        let subquery = SelectQuery {
            select,
            from: Some(FromClause {
                table: table.to_string(),
                alias: None,
            }),
            where_clause: Some(Expr::and(filters)),
            group_by: vec![Expr::column(None, self.to_field)],
            having,
            ..Default::default()
        };

        log::debug!(
            "Materialized lazy join {} on {} with {} requested field(s)",
            alias,
            table,
            requested.len()
        );

        Ok(JoinExpr {
            join_type: self.join_type,
            source: TableSource::Subquery(Box::new(subquery)),
            alias: alias.to_string(),
            constraint: Expr::equals(parent_key, Expr::column(Some(alias), self.to_field)),
        })
    }

    /// Source column inside the sub-select for a requested path.
    fn source_column(&self, path: &[String]) -> Result<ColumnRef, CatalogError> {
        let table = self.join_table.clickhouse_name();
        let unsupported = || CatalogError::UnsupportedJoinField {
            table: self.join_table.name().to_string(),
            path: path.join("."),
        };
        let (head, rest) = path.split_first().ok_or_else(unsupported)?;
        match find_field(&field_defs(self.join_table, false), head) {
            Some(FieldDef::Column(column)) if rest.is_empty() => {
                Ok(ColumnRef::new(Some(table), column))
            }
            Some(FieldDef::Json(column)) => {
                Ok(ColumnRef::new(Some(table), column).with_json_path(rest.to_vec()))
            }
            _ => Err(unsupported()),
        }
    }
}
