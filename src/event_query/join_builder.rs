//! Join decisions and join clauses of the event query builders.
//!
//! The sub-selects come from the same catalog joins lazy table resolution
//! uses; only the aliases (from the context) and the team filter (a bound
//! parameter instead of an inline id) differ.

use crate::{
    ast::{Expr, JoinExpr},
    query_planner::column_optimizer::ColumnOptimizer,
    table_catalog::{distinct_id_join, group_join, person_join, RequestedField},
};

use super::{
    errors::EventQueryError,
    filters::{Actions, Entity, EventFilter, PropertyGroup, PropertyType},
    property_groups::{group_properties_column, PERSON_PROPERTIES_COLUMN},
    QueryContext,
};

/// Columns, cohorts and group types an event query touches: the filter's
/// property groups, the entities' groups and the steps of every referenced
/// action.
pub fn event_query_columns(
    filter: &EventFilter,
    entities: &[Entity],
    actions: &Actions,
    extra_person_fields: &[String],
    person_on_events: bool,
) -> Result<ColumnOptimizer, EventQueryError> {
    let mut optimizer = ColumnOptimizer::new();

    let mut groups: Vec<&PropertyGroup> = filter.properties.iter().collect();
    for entity in entities {
        groups.extend(entity.properties());
        if let Entity::Actions { id, .. } = entity {
            let action = actions.get(*id)?;
            groups.extend(action.steps.iter().filter_map(|s| s.properties.as_ref()));
        }
    }

    for prop in groups.into_iter().flat_map(PropertyGroup::flat) {
        match prop.property_type {
            PropertyType::Event => {}
            PropertyType::Person => optimizer.record_person_property(&prop.key, person_on_events),
            PropertyType::Cohort => {
                if let Some(id) = prop.value.as_ref().and_then(|v| v.as_i64()) {
                    optimizer.record_cohort(id);
                }
            }
            PropertyType::Group => {
                if let Some(index) = prop.group_type_index {
                    optimizer.record_group_type(index);
                }
            }
        }
    }

    for field in extra_person_fields {
        optimizer.record_person_field(field, person_on_events);
    }

    log::debug!(
        "Event query columns: person properties {:?}, group types {:?}, cohorts used: {}",
        optimizer.person_property_keys(),
        optimizer.group_types_to_query(),
        optimizer.is_using_cohort_properties()
    );
    Ok(optimizer)
}

/// Which joins an event query needs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinPlan {
    pub distinct_ids: bool,
    pub persons: bool,
    pub group_types: Vec<u8>,
}

impl JoinPlan {
    /// Funnels skip the distinct id join when they aggregate by group or by
    /// distinct id, unless a cohort filter needs the person id.
    pub fn for_funnel(
        ctx: &QueryContext,
        optimizer: &ColumnOptimizer,
        aggregation_group_type_index: Option<u8>,
        aggregate_users_by_distinct_id: bool,
        extra_person_fields: &[String],
    ) -> Self {
        let by_other_target =
            aggregation_group_type_index.is_some() || aggregate_users_by_distinct_id;
        let distinct_ids = !by_other_target || optimizer.is_using_cohort_properties();
        Self::finish(ctx, optimizer, distinct_ids, extra_person_fields)
    }

    /// Stickiness always counts persons, so distinct ids are always joined.
    pub fn for_stickiness(ctx: &QueryContext, optimizer: &ColumnOptimizer) -> Self {
        Self::finish(ctx, optimizer, true, &[])
    }

    fn finish(
        ctx: &QueryContext,
        optimizer: &ColumnOptimizer,
        distinct_ids: bool,
        extra_person_fields: &[String],
    ) -> Self {
        let group_types = optimizer.group_types_to_query().iter().copied().collect();
        if ctx.person_on_events {
            return JoinPlan {
                distinct_ids: false,
                persons: false,
                group_types,
            };
        }
        let persons = optimizer.is_using_person_properties() || !extra_person_fields.is_empty();
        JoinPlan {
            distinct_ids: distinct_ids || persons,
            persons,
            group_types,
        }
    }

    /// Join clauses in query order: distinct ids, persons, groups.
    pub fn joins(
        &self,
        ctx: &QueryContext,
        optimizer: &ColumnOptimizer,
    ) -> Result<Vec<JoinExpr>, EventQueryError> {
        let mut joins = Vec::new();
        if self.distinct_ids {
            joins.push(distinct_id_join_clause(ctx)?);
        }
        if self.persons {
            joins.push(person_join_clause(ctx, optimizer)?);
        }
        for index in &self.group_types {
            joins.push(group_join_clause(ctx, *index)?);
        }
        log::debug!(
            "Event query joins: {}",
            joins.iter().map(|j| j.alias.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(joins)
    }
}

/// `pdi`: latest person id per distinct id.
pub fn distinct_id_join_clause(ctx: &QueryContext) -> Result<JoinExpr, EventQueryError> {
    Ok(distinct_id_join().materialize(
        &ctx.join_context(),
        &ctx.aliases.distinct_id,
        ctx.event_column("distinct_id"),
        &[RequestedField::renamed("person_id", &["person_id"])],
    )?)
}

/// Columns the person join exposes, sorted by output name.
pub fn person_fields(optimizer: &ColumnOptimizer) -> Vec<RequestedField> {
    let mut fields: Vec<RequestedField> = optimizer
        .person_columns_to_query()
        .into_iter()
        .map(|column| match column {
            "properties" => RequestedField::renamed(PERSON_PROPERTIES_COLUMN, &["properties"]),
            other => RequestedField::renamed(other, &[other]),
        })
        .collect();
    fields.sort_by(|a, b| a.output.cmp(&b.output));
    fields
}

/// `person`: latest person row, keyed by the person id of the distinct id join.
pub fn person_join_clause(
    ctx: &QueryContext,
    optimizer: &ColumnOptimizer,
) -> Result<JoinExpr, EventQueryError> {
    Ok(person_join().materialize(
        &ctx.join_context(),
        &ctx.aliases.person,
        Expr::column(Some(&ctx.aliases.distinct_id), "person_id"),
        &person_fields(optimizer),
    )?)
}

/// `groups_N`: latest properties of the group in `$group_N`.
pub fn group_join_clause(ctx: &QueryContext, index: u8) -> Result<JoinExpr, EventQueryError> {
    let spec = group_join(index).ok_or(EventQueryError::InvalidGroupTypeIndex(index))?;
    Ok(spec.materialize(
        &ctx.join_context(),
        &ctx.aliases.group(index),
        ctx.event_column(spec.from_field),
        &[RequestedField::renamed(&group_properties_column(index), &["group_properties"])],
    )?)
}
