use crate::{
    ast::SelectQuery,
    query_planner::{plan_ctx::PlanCtx, transformed::Transformed},
};

use super::errors::AnalyzerError;

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

pub trait AnalyzerPass {
    fn analyze(
        &self,
        query: SelectQuery,
        plan_ctx: &mut PlanCtx,
    ) -> AnalyzerResult<Transformed<SelectQuery>>;
}
