//! Active-interval counts per actor for one entity.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    ast::{Expr, FromClause, SelectQuery},
    clickhouse_query_generator::CompiledQuery,
    table_catalog::TableKind,
};

use super::{
    errors::EventQueryError,
    filter_builder::{
        action_filter, date_filter, null_person_filter, sampling_clause, team_filter,
    },
    filters::{
        ActionDefinition, Actions, Entity, EventFilter, PropertyGroup, PropertyOperatorType,
    },
    join_builder::{event_query_columns, JoinPlan},
    property_groups::PropertyCompiler,
    Fragment, QueryContext,
};

/// Stickiness event query input, as read by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickinessRequest {
    pub filter: EventFilter,
    pub entity: Entity,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

pub struct StickinessEventQuery<'a> {
    ctx: QueryContext,
    entity: &'a Entity,
    filter: &'a EventFilter,
    actions: &'a Actions,
}

impl<'a> StickinessEventQuery<'a> {
    pub fn new(
        ctx: QueryContext,
        entity: &'a Entity,
        filter: &'a EventFilter,
        actions: &'a Actions,
    ) -> Self {
        StickinessEventQuery {
            ctx,
            entity,
            filter,
            actions,
        }
    }

    pub fn build(&mut self) -> Result<SelectQuery, EventQueryError> {
        let filter = self.filter;
        let optimizer = event_query_columns(
            filter,
            std::slice::from_ref(self.entity),
            self.actions,
            &[],
            self.ctx.person_on_events,
        )?;
        let plan = JoinPlan::for_stickiness(&self.ctx, &optimizer);
        log::debug!("Stickiness event query for team {}: {:?}", self.ctx.team_id, plan);

        let target = self.ctx.person_id_column();
        let interval_start = Expr::call(
            filter.interval.trunc_function(),
            vec![Expr::call(
                "toTimeZone",
                vec![
                    Expr::call(
                        "toDateTime",
                        vec![
                            self.ctx.event_column("timestamp"),
                            Expr::InlineString("UTC".to_string()),
                        ],
                    ),
                    Expr::placeholder("timezone"),
                ],
            )],
        );
        let timezone = Fragment::new(()).with_param("timezone", json!(self.ctx.timezone))?;
        self.ctx.absorb(timezone)?;

        let mut conditions = vec![self.ctx.absorb(team_filter(&self.ctx)?)?];
        let dates = date_filter(&self.ctx, filter)?;
        conditions.extend(self.ctx.absorb(dates)?);
        conditions.push(self.entity_condition()?);

        let properties = PropertyGroup::combine(
            PropertyOperatorType::And,
            filter.properties.as_ref(),
            self.entity.properties(),
        );
        let compiler = PropertyCompiler::new(&self.ctx);
        if let Some(properties) = compiler.compile_optional(properties.as_ref())? {
            conditions.push(properties);
        }
        conditions.extend(null_person_filter(&self.ctx));

        let sample = sampling_clause(filter.sampling_factor.or(self.ctx.sampling_factor))?;
        let sample = self.ctx.absorb(sample)?;

        Ok(SelectQuery {
            select: vec![
                target.alias("aggregation_target"),
                Expr::call("countDistinct", vec![interval_start]).alias("num_intervals"),
            ],
            from: Some(FromClause {
                table: TableKind::Events.clickhouse_name().to_string(),
                alias: Some(self.ctx.aliases.event.clone()),
            }),
            sample,
            joins: plan.joins(&self.ctx, &optimizer)?,
            where_clause: Some(Expr::And(conditions)),
            group_by: vec![Expr::column(None, "aggregation_target")],
            ..Default::default()
        })
    }

    /// `equals(e.event, %(event)s)` for an event, the step filter for an action.
    fn entity_condition(&mut self) -> Result<Expr, EventQueryError> {
        match self.entity {
            Entity::Events { id, .. } => {
                let fragment = Fragment::new(Expr::equals(
                    self.ctx.event_column("event"),
                    Expr::placeholder("event"),
                ))
                .with_param("event", json!(id))?;
                self.ctx.absorb(fragment)
            }
            Entity::Actions { id, .. } => {
                let action = self.actions.get(*id)?;
                action_filter(&self.ctx, action, &PropertyCompiler::new(&self.ctx))
            }
        }
    }

    pub fn get_query(mut self) -> Result<CompiledQuery, EventQueryError> {
        let query = self.build()?;
        self.ctx.print(&query)
    }
}
