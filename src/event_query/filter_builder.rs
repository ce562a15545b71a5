//! WHERE and SAMPLE fragments shared by the event query builders.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};

use crate::ast::{CompareOp, Constant, Expr};

use super::{
    errors::EventQueryError,
    filters::{ActionDefinition, Actions, Entity, EventFilter},
    property_groups::PropertyCompiler,
    Fragment, QueryContext,
};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `equals(e.team_id, %(team_id)s)`
pub fn team_filter(ctx: &QueryContext) -> Result<Fragment<Expr>, EventQueryError> {
    Fragment::new(Expr::equals(ctx.event_column("team_id"), Expr::placeholder("team_id")))
        .with_param("team_id", json!(ctx.team_id))
}

/// Timestamp bounds of the filter, in the context timezone. Missing bounds add
/// nothing.
pub fn date_filter(
    ctx: &QueryContext,
    filter: &EventFilter,
) -> Result<Fragment<Vec<Expr>>, EventQueryError> {
    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
        if from > to {
            return Err(EventQueryError::InvalidDateRange { from, to });
        }
    }

    let tz = parse_timezone(&ctx.timezone)?;
    let mut fragment = Fragment::new(Vec::new());
    for (name, bound, op) in [
        ("date_from", filter.date_from, CompareOp::GtEq),
        ("date_to", filter.date_to, CompareOp::LtEq),
    ] {
        if let Some(bound) = bound {
            fragment.node.push(Expr::compare(
                op,
                ctx.event_column("timestamp"),
                Expr::call(
                    "toDateTime",
                    vec![Expr::placeholder(name), Expr::placeholder("timezone")],
                ),
            ));
            fragment = fragment.with_param(name, format_date(bound, tz))?;
        }
    }
    if !fragment.node.is_empty() {
        fragment = fragment.with_param("timezone", json!(ctx.timezone))?;
    }
    Ok(fragment)
}

fn parse_timezone(timezone: &str) -> Result<Tz, EventQueryError> {
    timezone
        .parse()
        .map_err(|_| EventQueryError::UnknownTimezone(timezone.to_string()))
}

/// Wall-clock text of `date` in `tz`, the form `toDateTime(_, tz)` reads back.
fn format_date(date: DateTime<Utc>, tz: Tz) -> Value {
    Value::String(date.with_timezone(&tz).format(DATE_FORMAT).to_string())
}

/// `SAMPLE %(sampling_factor)s` when sampling is configured.
pub fn sampling_clause(factor: Option<f64>) -> Result<Fragment<Option<Expr>>, EventQueryError> {
    match factor {
        None => Ok(Fragment::new(None)),
        Some(factor) if factor > 0.0 && factor <= 1.0 => {
            Fragment::new(Some(Expr::placeholder("sampling_factor")))
                .with_param("sampling_factor", json!(factor))
        }
        Some(factor) => Err(EventQueryError::InvalidSamplingFactor(factor)),
    }
}

/// With person-on-events, events that never got a person attached are skipped.
pub fn null_person_filter(ctx: &QueryContext) -> Option<Expr> {
    ctx.person_on_events
        .then(|| Expr::call("notEmpty", vec![ctx.event_column("person_id")]))
}

/// `in(e.event, %(<entity_name>)s)` over the events the entities stand for,
/// sorted and without duplicates. Actions contribute their step events.
pub fn entity_filter(
    ctx: &QueryContext,
    entities: &[Entity],
    actions: &Actions,
    entity_name: &str,
) -> Result<Fragment<Expr>, EventQueryError> {
    let mut events: Vec<String> = Vec::new();
    for entity in entities {
        match entity {
            Entity::Events { id, .. } => events.push(id.clone()),
            Entity::Actions { id, .. } => {
                let action = actions.get(*id)?;
                events.extend(action.step_events().into_iter().flatten().map(str::to_string));
            }
        }
    }
    events.sort();
    events.dedup();

    Fragment::new(Expr::compare(
        CompareOp::In,
        ctx.event_column("event"),
        Expr::placeholder(entity_name),
    ))
    .with_param(entity_name, json!(events))
}

/// OR of the action's steps; each step matches its event (if any) and its
/// property group (if any).
pub fn action_filter(
    ctx: &QueryContext,
    action: &ActionDefinition,
    compiler: &PropertyCompiler<'_>,
) -> Result<Expr, EventQueryError> {
    let steps = action
        .steps
        .iter()
        .map(|step| {
            let mut conditions = Vec::new();
            if let Some(event) = &step.event {
                conditions.push(Expr::equals(
                    ctx.event_column("event"),
                    Expr::Constant(Constant::String(event.clone())),
                ));
            }
            if let Some(properties) = compiler.compile_optional(step.properties.as_ref())? {
                conditions.push(properties);
            }
            Ok(Expr::And(conditions))
        })
        .collect::<Result<Vec<_>, EventQueryError>>()?;
    log::debug!("Action {} ({}) expands to {} step(s)", action.id, action.name, steps.len());
    Ok(Expr::Or(steps))
}
