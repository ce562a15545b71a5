//! clickquery - ClickHouse SQL for product analytics queries
//!
//! This crate compiles analytics queries into parameterized ClickHouse SQL:
//! - Selects over logical tables, with lazy joins resolved from field paths
//! - Funnel and stickiness event queries built from filter configurations

pub mod ast;
pub mod clickhouse_query_generator;
pub mod config;
pub mod errors;
pub mod event_query;
pub mod query_planner;
pub mod table_catalog;

use validator::Validate;

use ast::SelectQuery;
use clickhouse_query_generator::{generate_sql, CompiledQuery};
use config::CompilerConfig;
use errors::CompileError;
use event_query::{
    filters::Actions,
    funnel::{FunnelEventQuery, FunnelRequest},
    stickiness::{StickinessEventQuery, StickinessRequest},
    QueryContext,
};
use query_planner::{evaluate_select_query, plan_ctx::PlanCtx};

/// Resolve lazy tables, apply the team and limit guards and print.
pub fn compile_select(
    query: SelectQuery,
    config: &CompilerConfig,
) -> Result<CompiledQuery, CompileError> {
    config.validate().map_err(config::ConfigError::from)?;
    let mut plan_ctx = PlanCtx::from_config(config);
    let resolved = evaluate_select_query(query, &mut plan_ctx)?;
    Ok(generate_sql(&resolved)?)
}

/// Per-event rows of a funnel.
pub fn compile_funnel(
    request: &FunnelRequest,
    config: &CompilerConfig,
) -> Result<CompiledQuery, CompileError> {
    config.validate().map_err(config::ConfigError::from)?;
    let actions = Actions::new(request.actions.clone());
    let query = FunnelEventQuery::new(QueryContext::from_config(config), &request.filter, &actions)
        .with_extra_fields(request.extra_fields.clone())
        .with_extra_person_fields(request.extra_person_fields.clone());
    Ok(query.get_query(&request.options)?)
}

/// Active intervals per person for one entity.
pub fn compile_stickiness(
    request: &StickinessRequest,
    config: &CompilerConfig,
) -> Result<CompiledQuery, CompileError> {
    config.validate().map_err(config::ConfigError::from)?;
    let actions = Actions::new(request.actions.clone());
    let query = StickinessEventQuery::new(
        QueryContext::from_config(config),
        &request.entity,
        &request.filter,
        &actions,
    );
    Ok(query.get_query()?)
}
