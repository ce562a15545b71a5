//! Guards every compiled query gets regardless of what the caller wrote:
//! a `team_id` filter on the base table and a bounded LIMIT.

use crate::{
    ast::{ColumnRef, Expr, SelectQuery},
    query_planner::{
        analyzer::{
            analyzer_pass::{AnalyzerPass, AnalyzerResult},
            errors::{AnalyzerError, Pass},
        },
        plan_ctx::PlanCtx,
        transformed::Transformed,
    },
};

pub struct QueryGuards;

impl AnalyzerPass for QueryGuards {
    fn analyze(
        &self,
        mut query: SelectQuery,
        plan_ctx: &mut PlanCtx,
    ) -> AnalyzerResult<Transformed<SelectQuery>> {
        let from = query.from.as_ref().ok_or(AnalyzerError::MissingFromTable {
            pass: Pass::QueryGuards,
        })?;

        let team_column = ColumnRef::new(from.alias.as_deref(), "team_id");
        let guard = Expr::equals(Expr::Column(team_column), Expr::Inline(plan_ctx.team_id()));
        query.where_clause = Some(match query.where_clause.take() {
            None => guard,
            Some(existing) => Expr::And(vec![guard, existing]),
        });

        let max_limit = plan_ctx.max_limit();
        query.limit = Some(match query.limit {
            Some(limit) if limit <= max_limit => limit,
            Some(limit) => {
                log::warn!("LIMIT {} exceeds the maximum of {}, clamping", limit, max_limit);
                max_limit
            }
            None => max_limit,
        });

        Ok(Transformed::Yes(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FromClause;

    fn query(alias: Option<&str>, limit: Option<u64>, where_clause: Option<Expr>) -> SelectQuery {
        SelectQuery {
            select: vec![Expr::column(None, "event")],
            from: Some(FromClause {
                table: "events".to_string(),
                alias: alias.map(str::to_string),
            }),
            where_clause,
            limit,
            ..Default::default()
        }
    }

    #[test]
    fn test_team_guard_and_default_limit() {
        let mut plan_ctx = PlanCtx::new(42, false, 65535);
        let guarded = QueryGuards
            .analyze(query(None, None, None), &mut plan_ctx)
            .unwrap()
            .get_plan();
        assert_eq!(
            guarded.where_clause,
            Some(Expr::equals(Expr::column(None, "team_id"), Expr::Inline(42)))
        );
        assert_eq!(guarded.limit, Some(65535));
    }

    #[test]
    fn test_guard_comes_first_and_uses_alias() {
        let mut plan_ctx = PlanCtx::new(7, false, 100);
        let existing = Expr::equals(Expr::column(Some("e"), "event"), Expr::string("$pageview"));
        let guarded = QueryGuards
            .analyze(query(Some("e"), Some(10), Some(existing.clone())), &mut plan_ctx)
            .unwrap()
            .get_plan();
        assert_eq!(
            guarded.where_clause,
            Some(Expr::And(vec![
                Expr::equals(Expr::column(Some("e"), "team_id"), Expr::Inline(7)),
                existing,
            ]))
        );
        assert_eq!(guarded.limit, Some(10));
    }

    #[test]
    fn test_limit_is_clamped() {
        let mut plan_ctx = PlanCtx::new(1, false, 100);
        let guarded = QueryGuards
            .analyze(query(None, Some(1_000_000), None), &mut plan_ctx)
            .unwrap()
            .get_plan();
        assert_eq!(guarded.limit, Some(100));
    }

    #[test]
    fn test_missing_from() {
        let mut plan_ctx = PlanCtx::new(1, false, 100);
        let err = QueryGuards
            .analyze(SelectQuery::default(), &mut plan_ctx)
            .unwrap_err();
        assert_eq!(
            err,
            AnalyzerError::MissingFromTable {
                pass: Pass::QueryGuards
            }
        );
    }
}
