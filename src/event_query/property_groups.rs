//! Property group trees to boolean expressions.
//!
//! Filter values never reach the SQL text: they become [`Constant`]s and are
//! bound by the printer. Only the JSON keys of the extracted properties and the
//! filter values are user input; column and alias names come from the context.

use regex::Regex;
use serde_json::Value;

use crate::ast::{ColumnRef, CompareOp, Constant, Expr, FromClause, SelectQuery};

use super::{
    errors::EventQueryError,
    filters::{
        PropertyFilter, PropertyGroup, PropertyGroupItem, PropertyOperator, PropertyOperatorType,
        PropertyType,
    },
    QueryContext, TableAliases,
};

/// Highest group type index the events table has a `$group_N` column for.
pub const MAX_GROUP_TYPE_INDEX: u8 = 4;

/// Column the person join exposes the person properties under.
pub const PERSON_PROPERTIES_COLUMN: &str = "person_props";

/// Where person properties are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonPropertiesMode {
    /// `<person alias>.person_props` of the person join.
    UsingPersonPropertiesColumn,
    /// `<event alias>.person_properties`, flattened onto events.
    DirectOnEvents,
}

impl PersonPropertiesMode {
    pub fn for_context(ctx: &QueryContext) -> Self {
        if ctx.person_on_events {
            PersonPropertiesMode::DirectOnEvents
        } else {
            PersonPropertiesMode::UsingPersonPropertiesColumn
        }
    }
}

/// Group properties column exposed by the join of group type `index`.
pub fn group_properties_column(index: u8) -> String {
    format!("group_properties_{}", index)
}

pub struct PropertyCompiler<'a> {
    aliases: &'a TableAliases,
    mode: PersonPropertiesMode,
    /// Person id matched against cohort membership.
    person_id_joined_alias: Expr,
}

impl<'a> PropertyCompiler<'a> {
    pub fn new(ctx: &'a QueryContext) -> Self {
        PropertyCompiler {
            aliases: &ctx.aliases,
            mode: PersonPropertiesMode::for_context(ctx),
            person_id_joined_alias: ctx.person_id_column(),
        }
    }

    pub fn compile_group(&self, group: &PropertyGroup) -> Result<Expr, EventQueryError> {
        let items = group
            .values
            .iter()
            .map(|item| match item {
                PropertyGroupItem::Group(inner) => self.compile_group(inner),
                PropertyGroupItem::Filter(filter) => self.compile_filter(filter),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match group.operator {
            PropertyOperatorType::And => Expr::And(items),
            PropertyOperatorType::Or => Expr::Or(items),
        })
    }

    /// Compile an optional group; a missing group filters nothing.
    pub fn compile_optional(
        &self,
        group: Option<&PropertyGroup>,
    ) -> Result<Option<Expr>, EventQueryError> {
        group.map(|g| self.compile_group(g)).transpose()
    }

    pub fn compile_filter(&self, filter: &PropertyFilter) -> Result<Expr, EventQueryError> {
        if filter.property_type == PropertyType::Cohort {
            return self.cohort_filter(filter);
        }
        if filter.key.is_empty() {
            return Err(EventQueryError::invalid_filter(&filter.key, "property key is empty"));
        }

        let column = self.property_column(filter)?;
        let extracted = Expr::Column(column.clone().with_json_path(vec![filter.key.clone()]));

        let value = match (&filter.value, filter.operator.needs_value()) {
            (Some(Value::Null) | None, true) => {
                return Err(EventQueryError::invalid_filter(&filter.key, "operator needs a value"))
            }
            (value, _) => value.as_ref(),
        };

        let expr = match filter.operator {
            PropertyOperator::Exact => self.exact(extracted, value, &filter.key)?,
            PropertyOperator::IsNot => {
                Expr::Not(Box::new(self.exact(extracted, value, &filter.key)?))
            }
            PropertyOperator::Icontains => Expr::compare(
                CompareOp::ILike,
                extracted,
                contains_pattern(value, &filter.key)?,
            ),
            PropertyOperator::NotIcontains => Expr::compare(
                CompareOp::NotILike,
                extracted,
                contains_pattern(value, &filter.key)?,
            ),
            PropertyOperator::Regex => {
                Expr::compare(CompareOp::Regex, extracted, regex_value(value, &filter.key)?)
            }
            PropertyOperator::NotRegex => Expr::Not(Box::new(Expr::compare(
                CompareOp::Regex,
                extracted,
                regex_value(value, &filter.key)?,
            ))),
            PropertyOperator::Gt => numeric(CompareOp::Gt, extracted, value, &filter.key)?,
            PropertyOperator::Gte => numeric(CompareOp::GtEq, extracted, value, &filter.key)?,
            PropertyOperator::Lt => numeric(CompareOp::Lt, extracted, value, &filter.key)?,
            PropertyOperator::Lte => numeric(CompareOp::LtEq, extracted, value, &filter.key)?,
            PropertyOperator::IsSet => json_has(column, &filter.key),
            PropertyOperator::IsNotSet => Expr::Not(Box::new(json_has(column, &filter.key))),
            PropertyOperator::IsDateBefore => date(CompareOp::Lt, extracted, value, &filter.key)?,
            PropertyOperator::IsDateAfter => date(CompareOp::Gt, extracted, value, &filter.key)?,
        };
        Ok(expr)
    }

    /// JSON column holding the filter's properties.
    fn property_column(&self, filter: &PropertyFilter) -> Result<ColumnRef, EventQueryError> {
        match filter.property_type {
            PropertyType::Event => Ok(ColumnRef::new(Some(&self.aliases.event), "properties")),
            PropertyType::Person => Ok(match self.mode {
                PersonPropertiesMode::UsingPersonPropertiesColumn => {
                    ColumnRef::new(Some(&self.aliases.person), PERSON_PROPERTIES_COLUMN)
                }
                PersonPropertiesMode::DirectOnEvents => {
                    ColumnRef::new(Some(&self.aliases.event), "person_properties")
                }
            }),
            PropertyType::Group => {
                let index = filter.group_type_index.ok_or_else(|| {
                    EventQueryError::invalid_filter(
                        &filter.key,
                        "group filter without group_type_index",
                    )
                })?;
                if index > MAX_GROUP_TYPE_INDEX {
                    return Err(EventQueryError::InvalidGroupTypeIndex(index));
                }
                Ok(ColumnRef::new(
                    Some(&self.aliases.group(index)),
                    &group_properties_column(index),
                ))
            }
            PropertyType::Cohort => Err(EventQueryError::invalid_filter(
                &filter.key,
                "cohort filters have no property column",
            )),
        }
    }

    fn exact(
        &self,
        extracted: Expr,
        value: Option<&Value>,
        key: &str,
    ) -> Result<Expr, EventQueryError> {
        match value {
            Some(Value::Array(items)) => {
                let values = items
                    .iter()
                    .map(|item| scalar_string(Some(item), key))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::compare(
                    CompareOp::In,
                    extracted,
                    Expr::Constant(Constant::StringList(values)),
                ))
            }
            other => Ok(Expr::equals(
                extracted,
                Expr::Constant(Constant::String(scalar_string(other, key)?)),
            )),
        }
    }

    /// `in(<person id>, (SELECT person_id FROM cohortpeople ...))`
    fn cohort_filter(&self, filter: &PropertyFilter) -> Result<Expr, EventQueryError> {
        let cohort_id = filter.value.as_ref().and_then(cohort_id).ok_or_else(|| {
            EventQueryError::invalid_filter(&filter.key, "cohort value must be an integer id")
        })?;

        let members = SelectQuery {
            select: vec![Expr::column(None, "person_id")],
            from: Some(FromClause {
                table: "cohortpeople".to_string(),
                alias: None,
            }),
            where_clause: Some(Expr::And(vec![
                Expr::equals(Expr::column(None, "team_id"), Expr::placeholder("team_id")),
                Expr::equals(
                    Expr::column(None, "cohort_id"),
                    Expr::Constant(Constant::Integer(cohort_id)),
                ),
            ])),
            group_by: vec![
                Expr::column(None, "person_id"),
                Expr::column(None, "cohort_id"),
                Expr::column(None, "version"),
            ],
            having: Some(Expr::compare(
                CompareOp::Gt,
                Expr::call("sum", vec![Expr::column(None, "sign")]),
                Expr::Inline(0),
            )),
            ..Default::default()
        };

        let membership = Expr::compare(
            CompareOp::In,
            self.person_id_joined_alias.clone(),
            Expr::Subquery(Box::new(members)),
        );
        Ok(if filter.operator == PropertyOperator::IsNot {
            Expr::Not(Box::new(membership))
        } else {
            membership
        })
    }
}

/// Cohort ids arrive as numbers or numeric strings.
fn cohort_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Extracted JSON values are strings, so scalars compare in their string form.
fn scalar_string(value: Option<&Value>, key: &str) -> Result<String, EventQueryError> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        _ => Err(EventQueryError::invalid_filter(
            key,
            "expected a string, number or boolean value",
        )),
    }
}

/// `%value%` for the `ilike` operators.
fn contains_pattern(value: Option<&Value>, key: &str) -> Result<Expr, EventQueryError> {
    let value = scalar_string(value, key)?;
    Ok(Expr::Constant(Constant::String(format!("%{}%", value))))
}

fn regex_value(value: Option<&Value>, key: &str) -> Result<Expr, EventQueryError> {
    let pattern = scalar_string(value, key)?;
    Regex::new(&pattern)
        .map_err(|e| EventQueryError::invalid_filter(key, format!("invalid regex: {}", e)))?;
    Ok(Expr::Constant(Constant::String(pattern)))
}

fn numeric(
    op: CompareOp,
    extracted: Expr,
    value: Option<&Value>,
    key: &str,
) -> Result<Expr, EventQueryError> {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| EventQueryError::invalid_filter(key, "expected a numeric value"))?;
    Ok(Expr::compare(
        op,
        Expr::call("toFloat64OrNull", vec![extracted]),
        Expr::Constant(Constant::Float(number)),
    ))
}

fn date(
    op: CompareOp,
    extracted: Expr,
    value: Option<&Value>,
    key: &str,
) -> Result<Expr, EventQueryError> {
    let value = scalar_string(value, key)?;
    Ok(Expr::compare(
        op,
        Expr::call("parseDateTimeBestEffortOrNull", vec![extracted]),
        Expr::call(
            "parseDateTimeBestEffortOrNull",
            vec![Expr::Constant(Constant::String(value))],
        ),
    ))
}

fn json_has(column: ColumnRef, key: &str) -> Expr {
    Expr::call(
        "JSONHas",
        vec![Expr::Column(column), Expr::Constant(Constant::String(key.to_string()))],
    )
}
