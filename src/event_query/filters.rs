//! Filter configuration handed over by the filter layer: date range, property
//! groups, entities and the action definitions they may point at.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::errors::EventQueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyOperatorType {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    Event,
    Person,
    Group,
    Cohort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOperator {
    #[default]
    Exact,
    IsNot,
    Icontains,
    NotIcontains,
    Regex,
    NotRegex,
    Gt,
    Gte,
    Lt,
    Lte,
    IsSet,
    IsNotSet,
    IsDateBefore,
    IsDateAfter,
}

impl PropertyOperator {
    pub fn needs_value(&self) -> bool {
        !matches!(self, PropertyOperator::IsSet | PropertyOperator::IsNotSet)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub operator: PropertyOperator,
    #[serde(rename = "type", default)]
    pub property_type: PropertyType,
    #[serde(default)]
    pub group_type_index: Option<u8>,
}

impl PropertyFilter {
    pub fn new(
        key: &str,
        value: Value,
        operator: PropertyOperator,
        property_type: PropertyType,
    ) -> Self {
        PropertyFilter {
            key: key.to_string(),
            value: Some(value),
            operator,
            property_type,
            group_type_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyGroupItem {
    Group(PropertyGroup),
    Filter(PropertyFilter),
}

/// Boolean tree of property filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyGroup {
    #[serde(rename = "type")]
    pub operator: PropertyOperatorType,
    #[serde(default)]
    pub values: Vec<PropertyGroupItem>,
}

impl PropertyGroup {
    pub fn new(operator: PropertyOperatorType, values: Vec<PropertyGroupItem>) -> Self {
        PropertyGroup { operator, values }
    }

    pub fn and(filters: Vec<PropertyFilter>) -> Self {
        Self::new(
            PropertyOperatorType::And,
            filters.into_iter().map(PropertyGroupItem::Filter).collect(),
        )
    }

    pub fn or(filters: Vec<PropertyFilter>) -> Self {
        Self::new(
            PropertyOperatorType::Or,
            filters.into_iter().map(PropertyGroupItem::Filter).collect(),
        )
    }

    /// Combine two optional groups under `operator`, skipping absent ones.
    pub fn combine(
        operator: PropertyOperatorType,
        left: Option<&PropertyGroup>,
        right: Option<&PropertyGroup>,
    ) -> Option<PropertyGroup> {
        match (left, right) {
            (None, None) => None,
            (Some(group), None) | (None, Some(group)) => Some(group.clone()),
            (Some(l), Some(r)) => Some(PropertyGroup::new(
                operator,
                vec![
                    PropertyGroupItem::Group(l.clone()),
                    PropertyGroupItem::Group(r.clone()),
                ],
            )),
        }
    }

    /// All leaf filters, depth first.
    pub fn flat(&self) -> Vec<&PropertyFilter> {
        let mut out = Vec::new();
        self.collect_filters(&mut out);
        out
    }

    fn collect_filters<'a>(&'a self, out: &mut Vec<&'a PropertyFilter>) {
        for item in &self.values {
            match item {
                PropertyGroupItem::Group(group) => group.collect_filters(out),
                PropertyGroupItem::Filter(filter) => out.push(filter),
            }
        }
    }
}

/// What a query step counts: a raw event or a named action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Events {
        id: String,
        #[serde(default)]
        properties: Option<PropertyGroup>,
    },
    Actions {
        id: i64,
        #[serde(default)]
        properties: Option<PropertyGroup>,
    },
}

impl Entity {
    pub fn event(name: &str) -> Self {
        Entity::Events {
            id: name.to_string(),
            properties: None,
        }
    }

    pub fn action(id: i64) -> Self {
        Entity::Actions {
            id,
            properties: None,
        }
    }

    pub fn properties(&self) -> Option<&PropertyGroup> {
        match self {
            Entity::Events { properties, .. } | Entity::Actions { properties, .. } => {
                properties.as_ref()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// `None` matches any event.
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub properties: Option<PropertyGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<ActionStep>,
}

impl ActionDefinition {
    /// Distinct event names of the steps, `None` for steps matching any event.
    pub fn step_events(&self) -> Vec<Option<&str>> {
        let mut events: Vec<Option<&str>> = self.steps.iter().map(|s| s.event.as_deref()).collect();
        events.sort();
        events.dedup();
        events
    }
}

/// Action definitions available to one compilation.
#[derive(Debug, Clone, Default)]
pub struct Actions {
    by_id: HashMap<i64, ActionDefinition>,
}

impl Actions {
    pub fn new(definitions: Vec<ActionDefinition>) -> Self {
        Actions {
            by_id: definitions.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    pub fn get(&self, id: i64) -> Result<&ActionDefinition, EventQueryError> {
        self.by_id.get(&id).ok_or(EventQueryError::UnknownAction(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl Interval {
    /// ClickHouse function truncating a timestamp to the interval start.
    pub fn trunc_function(&self) -> &'static str {
        match self {
            Interval::Minute => "toStartOfMinute",
            Interval::Hour => "toStartOfHour",
            Interval::Day => "toStartOfDay",
            Interval::Week => "toStartOfWeek",
            Interval::Month => "toStartOfMonth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Option<PropertyGroup>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub sampling_factor: Option<f64>,
    #[serde(default)]
    pub aggregation_group_type_index: Option<u8>,
    #[serde(default)]
    pub aggregate_users_by_distinct_id: bool,
    #[serde(default)]
    pub interval: Interval,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_group_from_json() {
        let group: PropertyGroup = serde_json::from_value(json!({
            "type": "AND",
            "values": [
                {"key": "$browser", "value": "Chrome", "type": "event"},
                {"type": "OR", "values": [
                    {"key": "email", "value": "@posthog.com", "operator": "icontains", "type": "person"},
                    {"key": "id", "value": 3, "type": "cohort"}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(group.operator, PropertyOperatorType::And);
        let filters = group.flat();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].operator, PropertyOperator::Exact);
        assert_eq!(filters[1].property_type, PropertyType::Person);
        assert_eq!(filters[2].property_type, PropertyType::Cohort);
    }

    #[test]
    fn test_entity_from_json() {
        let entities: Vec<Entity> = serde_json::from_value(json!([
            {"type": "events", "id": "$pageview"},
            {"type": "actions", "id": 7}
        ]))
        .unwrap();
        assert_eq!(entities, vec![Entity::event("$pageview"), Entity::action(7)]);
    }

    #[test]
    fn test_combine_skips_missing_groups() {
        let group = PropertyGroup::and(vec![]);
        assert_eq!(PropertyGroup::combine(PropertyOperatorType::And, None, None), None);
        assert_eq!(
            PropertyGroup::combine(PropertyOperatorType::And, Some(&group), None),
            Some(group.clone())
        );
        let both =
            PropertyGroup::combine(PropertyOperatorType::And, Some(&group), Some(&group)).unwrap();
        assert_eq!(both.values.len(), 2);
    }

    #[test]
    fn test_unknown_action() {
        let actions = Actions::new(vec![]);
        assert!(matches!(actions.get(3), Err(EventQueryError::UnknownAction(3))));
    }

    #[test]
    fn test_step_events_are_sorted_and_unique() {
        let action = ActionDefinition {
            id: 1,
            name: "signed up".to_string(),
            steps: vec![
                ActionStep { event: Some("b".into()), properties: None },
                ActionStep { event: Some("a".into()), properties: None },
                ActionStep { event: Some("b".into()), properties: None },
            ],
        };
        assert_eq!(action.step_events(), vec![Some("a"), Some("b")]);
    }
}
