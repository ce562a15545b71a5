//! Turns a parsed select over logical tables into one over physical tables,
//! with every lazy join it needs materialized.

use crate::ast::SelectQuery;

use analyzer::errors::AnalyzerError;
use plan_ctx::PlanCtx;

pub mod analyzer;
pub mod column_optimizer;
pub mod plan_ctx;
pub mod transformed;


pub fn evaluate_select_query(
    query: SelectQuery,
    plan_ctx: &mut PlanCtx,
) -> Result<SelectQuery, AnalyzerError> {
    analyzer::initial_analyzing(query, plan_ctx)
}
