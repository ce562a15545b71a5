//! Tracks which optional columns a compiled query actually uses.
//!
//! Columns are accumulated per table (a join alias, or a logical table name
//! such as `events` / `persons` for the event query builders). Join SELECT
//! lists and join decisions are derived from what ends up recorded here.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    ast::{Expr, SelectQuery},
    table_catalog::TableKind,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptimizer {
    columns: BTreeMap<String, BTreeSet<String>>,
    person_property_keys: BTreeSet<String>,
    cohort_ids: BTreeSet<i64>,
    group_types: BTreeSet<u8>,
}

impl ColumnOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, table: &str, column: &str) {
        self.columns
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string());
    }

    pub fn required(&self, table: &str, field: &str) -> bool {
        self.columns
            .get(table)
            .is_some_and(|columns| columns.contains(field))
    }

    /// Columns recorded for `table`, sorted.
    pub fn columns(&self, table: &str) -> impl Iterator<Item = &str> {
        self.columns
            .get(table)
            .into_iter()
            .flat_map(|columns| columns.iter().map(String::as_str))
    }

    /// Record every resolved column reference of `query`. References without a
    /// table alias are recorded under `base_table`.
    pub fn observe_select(&mut self, query: &SelectQuery, base_table: &str) {
        for expr in query.expressions() {
            self.observe_expr(expr, base_table);
        }
        for join in &query.joins {
            self.observe_expr(&join.constraint, base_table);
        }
    }

    pub fn observe_expr(&mut self, expr: &Expr, base_table: &str) {
        expr.walk(&mut |node| {
            if let Expr::Column(column) = node {
                let table = column.table_alias.as_deref().unwrap_or(base_table);
                self.record(table, &column.column);
            }
        });
    }

    /// A person property filter on `key`, read from the flattened events
    /// column with person-on-events and from the person join otherwise.
    pub fn record_person_property(&mut self, key: &str, person_on_events: bool) {
        self.person_property_keys.insert(key.to_string());
        if person_on_events {
            self.record(TableKind::Events.name(), "person_properties");
        } else {
            self.record(TableKind::Persons.name(), "properties");
        }
    }

    /// A person column exposed next to the event (`created_at`, ...).
    pub fn record_person_field(&mut self, field: &str, person_on_events: bool) {
        if person_on_events {
            self.record(TableKind::Events.name(), &format!("person_{}", field));
        } else {
            self.record(TableKind::Persons.name(), field);
        }
    }

    pub fn record_cohort(&mut self, cohort_id: i64) {
        self.cohort_ids.insert(cohort_id);
    }

    pub fn record_group_type(&mut self, index: u8) {
        self.group_types.insert(index);
    }

    pub fn is_using_person_properties(&self) -> bool {
        !self.person_property_keys.is_empty()
    }

    pub fn is_using_cohort_properties(&self) -> bool {
        !self.cohort_ids.is_empty()
    }

    pub fn person_property_keys(&self) -> &BTreeSet<String> {
        &self.person_property_keys
    }

    pub fn group_types_to_query(&self) -> &BTreeSet<u8> {
        &self.group_types
    }

    /// Flattened person columns on events the query needs (sorted).
    pub fn person_on_event_columns_to_query(&self) -> Vec<&str> {
        self.columns(TableKind::Events.name())
            .filter(|column| column.starts_with("person_"))
            .collect()
    }

    /// Columns the person join has to expose (sorted).
    pub fn person_columns_to_query(&self) -> Vec<&str> {
        self.columns(TableKind::Persons.name()).collect()
    }
}
