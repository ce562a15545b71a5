//! # Query Analyzer
//!
//! Runs the analysis passes over a parsed [`SelectQuery`] until it only
//! contains physical tables and resolved columns:
//!
//! ```text
//! 1. LazyTableResolver - Resolve field paths, create and prune lazy joins
//! 2. QueryGuards       - Team filter on the base table, bounded LIMIT
//! ```
//!
//! ## Module Organization
//!
//! - `analyzer_pass.rs`: Pass trait and result alias
//! - `join_registry.rs`: Join nodes keyed by (table, parent alias, field)
//! - `lazy_table_resolver.rs`: Field walk against the table catalog
//! - `query_guards.rs`: Tenant isolation and row limits

use analyzer_pass::AnalyzerResult;

use crate::{
    ast::SelectQuery,
    query_planner::analyzer::{
        analyzer_pass::AnalyzerPass, lazy_table_resolver::LazyTableResolver,
        query_guards::QueryGuards,
    },
};

use super::plan_ctx::PlanCtx;

pub mod analyzer_pass;
pub mod errors;
pub mod join_registry;
mod lazy_table_resolver;
mod query_guards;

pub fn initial_analyzing(
    query: SelectQuery,
    plan_ctx: &mut PlanCtx,
) -> AnalyzerResult<SelectQuery> {
    log::debug!("ANALYZER: Entering initial_analyzing with {}", plan_ctx);

    let transformed = LazyTableResolver.analyze(query, plan_ctx)?;
    log::trace!("LazyTableResolver transformed: {}", transformed.is_yes());
    let query = transformed.get_plan();

    let query = QueryGuards.analyze(query, plan_ctx)?.get_plan();

    log::debug!("ANALYZER: initial_analyzing done");
    Ok(query)
}
