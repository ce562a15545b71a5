//! # Event Query Builders
//!
//! Assemble whole analytical queries over `events` from reusable fragments:
//!
//! ```text
//! filter_builder   team, date range, sampling, entity and action filters
//! property_groups  property group trees -> boolean expressions
//! join_builder     which joins a query needs, and their sub-selects
//! funnel           per-event rows for funnel step sequencing
//! stickiness       active-interval counts per actor
//! ```
//!
//! Fragments are typed AST pieces. Named parameters they introduce travel with
//! them in a [`Fragment`] and are merged into the [`QueryContext`] by the
//! builder, so the printed statement and its parameters come from one map.

use crate::{
    ast::{Expr, SelectQuery},
    clickhouse_query_generator::{print_ast, CompiledQuery, ParamMap},
    config::CompilerConfig,
    table_catalog::JoinContext,
};

pub mod errors;
pub mod filter_builder;
pub mod filters;
pub mod funnel;
pub mod join_builder;
pub mod property_groups;
pub mod stickiness;

use errors::EventQueryError;

/// Table aliases used by the event query builders.
#[derive(Debug, Clone, PartialEq)]
pub struct TableAliases {
    pub event: String,
    pub distinct_id: String,
    pub person: String,
    /// Group joins are aliased `<prefix><group_type_index>`.
    pub group_prefix: String,
}

impl Default for TableAliases {
    fn default() -> Self {
        TableAliases {
            event: "e".to_string(),
            distinct_id: "pdi".to_string(),
            person: "person".to_string(),
            group_prefix: "groups_".to_string(),
        }
    }
}

impl TableAliases {
    pub fn group(&self, index: u8) -> String {
        format!("{}{}", self.group_prefix, index)
    }
}

/// State of one event query compilation.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub team_id: i64,
    pub person_on_events: bool,
    pub sampling_factor: Option<f64>,
    pub timezone: String,
    pub aliases: TableAliases,
    pub params: ParamMap,
}

impl QueryContext {
    pub fn new(team_id: i64) -> Self {
        QueryContext {
            team_id,
            person_on_events: false,
            sampling_factor: None,
            timezone: "UTC".to_string(),
            aliases: TableAliases::default(),
            params: ParamMap::new(),
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        QueryContext {
            person_on_events: config.person_on_events,
            sampling_factor: config.sampling_factor,
            timezone: config.timezone.clone(),
            ..Self::new(config.team_id)
        }
    }

    /// `<event alias>.<column>`
    pub fn event_column(&self, column: &str) -> Expr {
        Expr::column(Some(&self.aliases.event), column)
    }

    /// Column the person id of an event is read from: the flattened events
    /// column with person-on-events, the distinct id join otherwise.
    pub fn person_id_column(&self) -> Expr {
        if self.person_on_events {
            self.event_column("person_id")
        } else {
            Expr::column(Some(&self.aliases.distinct_id), "person_id")
        }
    }

    /// Lazy join sub-selects filter on the bound `team_id` parameter.
    pub fn join_context(&self) -> JoinContext {
        JoinContext {
            team_filter: Expr::placeholder("team_id"),
        }
    }

    /// Merge the fragment's parameters and hand back its node.
    pub fn absorb<T>(&mut self, fragment: Fragment<T>) -> Result<T, EventQueryError> {
        self.params.merge(fragment.params)?;
        Ok(fragment.node)
    }

    /// Print `query` against the parameters collected so far.
    pub fn print(mut self, query: &SelectQuery) -> Result<CompiledQuery, EventQueryError> {
        let sql = print_ast(query, &mut self.params)?;
        Ok(CompiledQuery {
            sql,
            params: self.params,
        })
    }
}

/// An AST piece with the named parameters it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment<T> {
    pub node: T,
    pub params: ParamMap,
}

impl<T> Fragment<T> {
    pub fn new(node: T) -> Self {
        Fragment {
            node,
            params: ParamMap::new(),
        }
    }

    pub fn with_param(
        mut self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<Self, EventQueryError> {
        self.params.insert(name, value)?;
        Ok(self)
    }
}
