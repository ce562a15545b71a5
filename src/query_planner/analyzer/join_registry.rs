//! Join nodes created while resolving one query.
//!
//! A join is identified by its canonical key (joined table, parent alias, join
//! field), never by the path string that reached it, so `person.id` and
//! `pdi.person.id` land on the same node.

use std::collections::HashMap;

use crate::{
    ast::{Expr, JoinExpr},
    query_planner::column_optimizer::ColumnOptimizer,
    table_catalog::{JoinContext, LazyJoin, RequestedField, TableKind},
};

use super::errors::AnalyzerError;

/// Separator between hops in generated join aliases.
pub const ALIAS_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinKey {
    pub table: TableKind,
    pub parent_alias: String,
    pub field: String,
}

impl JoinKey {
    pub fn alias(&self) -> String {
        format!("{}{}{}", self.parent_alias, ALIAS_SEPARATOR, self.field)
    }

    fn describe(&self) -> String {
        format!("{}.{} -> {}", self.parent_alias, self.field, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    /// Referenced by the query itself.
    Query,
    /// Needed by the ON clause of a join hanging off this one.
    ChildJoin,
}

#[derive(Debug, Clone)]
pub struct JoinNode {
    pub alias: String,
    pub key: JoinKey,
    pub spec: LazyJoin,
    pub parent_key: Expr,
    /// Union of every field requested through this node, first request first.
    pub select_columns: Vec<(RequestedField, RequestOrigin)>,
}

#[derive(Debug, Default)]
pub struct JoinRegistry {
    nodes: Vec<JoinNode>,
    by_key: HashMap<JoinKey, usize>,
    by_alias: HashMap<String, usize>,
}

impl JoinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the node for `key`, creating it on first use.
    pub fn get_or_create(
        &mut self,
        key: JoinKey,
        spec: LazyJoin,
        parent_key: Expr,
    ) -> Result<usize, AnalyzerError> {
        if let Some(index) = self.by_key.get(&key) {
            return Ok(*index);
        }

        let alias = key.alias();
        if let Some(existing) = self.by_alias.get(&alias) {
            return Err(AnalyzerError::AliasCollision {
                alias,
                existing: self.nodes[*existing].key.describe(),
                requested: key.describe(),
            });
        }

        log::debug!("Creating lazy join {} ({})", alias, key.describe());
        let index = self.nodes.len();
        self.by_key.insert(key.clone(), index);
        self.by_alias.insert(alias.clone(), index);
        self.nodes.push(JoinNode {
            alias,
            key,
            spec,
            parent_key,
            select_columns: vec![],
        });
        Ok(index)
    }

    /// Add `field` to the node's SELECT list unless a field with the same
    /// output name is already there. Child-join requests are always kept;
    /// query requests only while the column is still referenced.
    pub fn request(&mut self, index: usize, field: RequestedField, origin: RequestOrigin) {
        let node = &mut self.nodes[index];
        if field.output == node.spec.to_field {
            return;
        }
        match node
            .select_columns
            .iter_mut()
            .find(|(existing, _)| existing.output == field.output)
        {
            Some((_, existing_origin)) => {
                if origin == RequestOrigin::ChildJoin {
                    *existing_origin = RequestOrigin::ChildJoin;
                }
            }
            None => node.select_columns.push((field, origin)),
        }
    }

    pub fn node(&self, index: usize) -> &JoinNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Build the join clauses in creation order, dropping query-requested
    /// columns the optimizer did not see referenced.
    pub fn materialize(
        &self,
        ctx: &JoinContext,
        optimizer: &ColumnOptimizer,
    ) -> Result<Vec<JoinExpr>, AnalyzerError> {
        self.nodes
            .iter()
            .map(|node| {
                let requested: Vec<RequestedField> = node
                    .select_columns
                    .iter()
                    .filter(|(field, origin)| {
                        *origin == RequestOrigin::ChildJoin
                            || optimizer.required(&node.alias, &field.output)
                    })
                    .map(|(field, _)| field.clone())
                    .collect();
                Ok(node
                    .spec
                    .materialize(ctx, &node.alias, node.parent_key.clone(), &requested)?)
            })
            .collect()
    }
}
