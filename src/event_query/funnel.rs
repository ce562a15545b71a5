//! Per-event rows feeding funnel step sequencing.
//!
//! [`FunnelEventQuery::build`] returns the statement unprinted so the funnel
//! layer can add its step columns, extra joins and step filters before
//! handing it back to [`FunnelEventQuery::print`].

use serde::{Deserialize, Serialize};

use crate::{
    ast::{Expr, FromClause, SelectQuery},
    clickhouse_query_generator::CompiledQuery,
    query_planner::column_optimizer::ColumnOptimizer,
    table_catalog::TableKind,
};

use super::{
    errors::EventQueryError,
    filter_builder::{date_filter, entity_filter, null_person_filter, sampling_clause, team_filter},
    filters::{ActionDefinition, Actions, Entity, EventFilter},
    join_builder::{event_query_columns, person_fields, JoinPlan},
    property_groups::{PropertyCompiler, MAX_GROUP_TYPE_INDEX},
    QueryContext,
};

fn default_entity_name() -> String {
    "events".to_string()
}

/// Per-call options of a funnel event query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelQueryOptions {
    /// Entities to filter on instead of the filter's.
    #[serde(default)]
    pub entities: Option<Vec<Entity>>,
    /// Parameter name of the entity event list.
    #[serde(default = "default_entity_name")]
    pub entity_name: String,
    #[serde(default)]
    pub skip_entity_filter: bool,
}

impl Default for FunnelQueryOptions {
    fn default() -> Self {
        FunnelQueryOptions {
            entities: None,
            entity_name: default_entity_name(),
            skip_entity_filter: false,
        }
    }
}

/// Funnel event query input, as read by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelRequest {
    pub filter: EventFilter,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    #[serde(default)]
    pub extra_fields: Vec<String>,
    #[serde(default)]
    pub extra_person_fields: Vec<String>,
    #[serde(flatten)]
    pub options: FunnelQueryOptions,
}

/// Column an event is attributed to.
pub fn aggregation_target(
    ctx: &QueryContext,
    aggregation_group_type_index: Option<u8>,
    aggregate_users_by_distinct_id: bool,
) -> Result<Expr, EventQueryError> {
    if let Some(index) = aggregation_group_type_index {
        if index > MAX_GROUP_TYPE_INDEX {
            return Err(EventQueryError::InvalidGroupTypeIndex(index));
        }
        return Ok(ctx.event_column(&format!("$group_{}", index)));
    }
    if ctx.person_on_events {
        Ok(ctx.event_column("person_id"))
    } else if aggregate_users_by_distinct_id {
        Ok(ctx.event_column("distinct_id"))
    } else {
        Ok(ctx.person_id_column())
    }
}

pub struct FunnelEventQuery<'a> {
    ctx: QueryContext,
    filter: &'a EventFilter,
    actions: &'a Actions,
    extra_fields: Vec<String>,
    extra_person_fields: Vec<String>,
}

impl<'a> FunnelEventQuery<'a> {
    pub fn new(ctx: QueryContext, filter: &'a EventFilter, actions: &'a Actions) -> Self {
        FunnelEventQuery {
            ctx,
            filter,
            actions,
            extra_fields: vec![],
            extra_person_fields: vec![],
        }
    }

    /// Event columns selected as `e.<field> AS <field>`.
    pub fn with_extra_fields(mut self, fields: Vec<String>) -> Self {
        self.extra_fields = fields;
        self
    }

    /// Person columns exposed by the person join (or the flattened columns).
    pub fn with_extra_person_fields(mut self, fields: Vec<String>) -> Self {
        self.extra_person_fields = fields;
        self
    }

    pub fn build(&mut self, options: &FunnelQueryOptions) -> Result<SelectQuery, EventQueryError> {
        let filter = self.filter;
        let optimizer = event_query_columns(
            filter,
            &filter.entities,
            self.actions,
            &self.extra_person_fields,
            self.ctx.person_on_events,
        )?;
        let plan = JoinPlan::for_funnel(
            &self.ctx,
            &optimizer,
            filter.aggregation_group_type_index,
            filter.aggregate_users_by_distinct_id,
            &self.extra_person_fields,
        );
        log::debug!("Funnel event query for team {}: {:?}", self.ctx.team_id, plan);

        let select = self.select_list(&optimizer, &plan)?;

        let mut conditions = vec![self.ctx.absorb(team_filter(&self.ctx)?)?];
        if !options.skip_entity_filter {
            let entities = options.entities.as_deref().unwrap_or(&filter.entities);
            let fragment = entity_filter(&self.ctx, entities, self.actions, &options.entity_name)?;
            conditions.push(self.ctx.absorb(fragment)?);
        }
        let dates = date_filter(&self.ctx, filter)?;
        conditions.extend(self.ctx.absorb(dates)?);
        let compiler = PropertyCompiler::new(&self.ctx);
        if let Some(properties) = compiler.compile_optional(filter.properties.as_ref())? {
            conditions.push(properties);
        }
        conditions.extend(null_person_filter(&self.ctx));

        let sample = sampling_clause(filter.sampling_factor.or(self.ctx.sampling_factor))?;
        let sample = self.ctx.absorb(sample)?;

        Ok(SelectQuery {
            select,
            from: Some(FromClause {
                table: TableKind::Events.clickhouse_name().to_string(),
                alias: Some(self.ctx.aliases.event.clone()),
            }),
            sample,
            joins: plan.joins(&self.ctx, &optimizer)?,
            where_clause: Some(Expr::And(conditions)),
            ..Default::default()
        })
    }

    fn select_list(
        &self,
        optimizer: &ColumnOptimizer,
        plan: &JoinPlan,
    ) -> Result<Vec<Expr>, EventQueryError> {
        let ctx = &self.ctx;
        let mut select = vec![
            ctx.event_column("timestamp").alias("timestamp"),
            aggregation_target(
                ctx,
                self.filter.aggregation_group_type_index,
                self.filter.aggregate_users_by_distinct_id,
            )?
            .alias("aggregation_target"),
        ];
        select.extend(
            self.extra_fields
                .iter()
                .map(|field| ctx.event_column(field).alias(field)),
        );

        if ctx.person_on_events {
            select.push(ctx.event_column("person_id").alias("person_id"));
            select.extend(
                optimizer
                    .person_on_event_columns_to_query()
                    .into_iter()
                    .map(|column| ctx.event_column(column).alias(column)),
            );
        } else {
            if plan.distinct_ids {
                select.push(ctx.person_id_column().alias("person_id"));
            }
            if plan.persons {
                select.extend(person_fields(optimizer).into_iter().map(|field| {
                    Expr::column(Some(&ctx.aliases.person), &field.output).alias(&field.output)
                }));
            }
        }
        Ok(select)
    }

    /// Build and print in one go.
    pub fn get_query(
        mut self,
        options: &FunnelQueryOptions,
    ) -> Result<CompiledQuery, EventQueryError> {
        let query = self.build(options)?;
        self.print(&query)
    }

    /// Print a (possibly extended) statement from [`build`](Self::build).
    pub fn print(self, query: &SelectQuery) -> Result<CompiledQuery, EventQueryError> {
        self.ctx.print(query)
    }
}
