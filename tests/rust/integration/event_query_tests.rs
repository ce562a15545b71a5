use clickquery::{
    compile_funnel, compile_stickiness,
    config::CompilerConfig,
    errors::CompileError,
    event_query::{
        errors::EventQueryError,
        filters::{
            ActionDefinition, ActionStep, Entity, EventFilter, Interval, PropertyFilter,
            PropertyGroup, PropertyOperator, PropertyType,
        },
        funnel::{FunnelQueryOptions, FunnelRequest},
        stickiness::StickinessRequest,
    },
};
use serde_json::json;
use test_case::test_case;

fn config(person_on_events: bool) -> CompilerConfig {
    CompilerConfig {
        team_id: 7,
        person_on_events,
        ..Default::default()
    }
}

fn funnel_request(filter: EventFilter) -> FunnelRequest {
    FunnelRequest {
        filter,
        actions: vec![],
        extra_fields: vec![],
        extra_person_fields: vec![],
        options: FunnelQueryOptions::default(),
    }
}

fn cohort_filter() -> PropertyGroup {
    PropertyGroup::and(vec![PropertyFilter::new(
        "id",
        json!(12),
        PropertyOperator::Exact,
        PropertyType::Cohort,
    )])
}

#[test]
fn test_entity_list_is_sorted() {
    let filter = EventFilter {
        entities: vec![
            Entity::event("zeta"),
            Entity::event("alpha"),
            Entity::event("mid"),
            Entity::event("alpha"),
        ],
        ..Default::default()
    };
    let compiled = compile_funnel(&funnel_request(filter), &config(false)).unwrap();
    assert_eq!(compiled.params.get("events"), Some(&json!(["alpha", "mid", "zeta"])));
    assert_eq!(compiled.params.get("team_id"), Some(&json!(7)));
}

// (person on events, group aggregation) -> (pdi joined, person id column used by the cohort filter)
#[test_case(false, None => (true, "in(pdi.person_id, (SELECT person_id FROM cohortpeople"); "joined persons")]
#[test_case(false, Some(1) => (true, "in(pdi.person_id, (SELECT person_id FROM cohortpeople"); "group aggregation keeps pdi for cohort")]
#[test_case(true, None => (false, "in(e.person_id, (SELECT person_id FROM cohortpeople"); "person on events")]
#[test_case(true, Some(1) => (false, "in(e.person_id, (SELECT person_id FROM cohortpeople"); "person on events with group aggregation")]
fn test_cohort_filter_join_rule(
    person_on_events: bool,
    group_index: Option<u8>,
) -> (bool, &'static str) {
    let filter = EventFilter {
        entities: vec![Entity::event("$pageview")],
        properties: Some(cohort_filter()),
        aggregation_group_type_index: group_index,
        ..Default::default()
    };
    let compiled = compile_funnel(&funnel_request(filter), &config(person_on_events)).unwrap();
    let prefix = if person_on_events {
        "in(e.person_id, (SELECT person_id FROM cohortpeople"
    } else {
        "in(pdi.person_id, (SELECT person_id FROM cohortpeople"
    };
    assert!(compiled.sql.contains(prefix), "{}", compiled.sql);
    assert_eq!(compiled.params.get("hogql_val_0"), Some(&json!(12)));
    (compiled.sql.contains("AS pdi ON"), prefix)
}

#[test]
fn test_person_on_events_funnel_skips_unattached_events() {
    let filter = EventFilter {
        entities: vec![Entity::event("$pageview")],
        properties: Some(PropertyGroup::and(vec![PropertyFilter::new(
            "email",
            json!("@example.com"),
            PropertyOperator::Icontains,
            PropertyType::Person,
        )])),
        ..Default::default()
    };
    let compiled = compile_funnel(&funnel_request(filter), &config(true)).unwrap();
    assert!(!compiled.sql.contains("JOIN"));
    assert!(compiled.sql.contains("e.person_properties AS person_properties"));
    assert!(compiled.sql.ends_with("notEmpty(e.person_id))"));
}

#[test]
fn test_funnel_sampling_from_config() {
    let filter = EventFilter {
        entities: vec![Entity::event("$pageview")],
        ..Default::default()
    };
    let sampled = CompilerConfig {
        sampling_factor: Some(0.5),
        ..config(false)
    };
    let compiled = compile_funnel(&funnel_request(filter), &sampled).unwrap();
    assert!(compiled.sql.contains("FROM events AS e SAMPLE %(sampling_factor)s"));
    assert_eq!(compiled.params.get("sampling_factor"), Some(&json!(0.5)));
}

#[test]
fn test_stickiness_with_action_and_dates() {
    let request = StickinessRequest {
        filter: EventFilter {
            date_from: Some("2024-03-01T00:00:00Z".parse().unwrap()),
            date_to: Some("2024-03-31T00:00:00Z".parse().unwrap()),
            interval: Interval::Day,
            ..Default::default()
        },
        entity: Entity::action(4),
        actions: vec![ActionDefinition {
            id: 4,
            name: "checkout".to_string(),
            steps: vec![
                ActionStep {
                    event: Some("checkout_started".to_string()),
                    properties: None,
                },
                ActionStep {
                    event: Some("checkout_completed".to_string()),
                    properties: None,
                },
            ],
        }],
    };
    let berlin = CompilerConfig {
        timezone: "Europe/Berlin".to_string(),
        ..config(false)
    };
    let compiled = compile_stickiness(&request, &berlin).unwrap();
    assert!(compiled.sql.contains(
        "countDistinct(toStartOfDay(toTimeZone(toDateTime(e.timestamp, 'UTC'), %(timezone)s))) AS num_intervals"
    ));
    assert!(compiled.sql.contains(
        "or(equals(e.event, %(hogql_val_0)s), equals(e.event, %(hogql_val_1)s))"
    ));
    assert!(compiled.sql.ends_with("GROUP BY aggregation_target"));
    assert_eq!(compiled.params.get("timezone"), Some(&json!("Europe/Berlin")));
    assert_eq!(compiled.params.get("date_from"), Some(&json!("2024-03-01 01:00:00")));
    assert_eq!(compiled.params.get("date_to"), Some(&json!("2024-03-31 01:00:00")));
}

#[test]
fn test_stickiness_unknown_action() {
    let request = StickinessRequest {
        filter: EventFilter::default(),
        entity: Entity::action(99),
        actions: vec![],
    };
    let err = compile_stickiness(&request, &config(false)).unwrap_err();
    assert!(matches!(err, CompileError::EventQuery(EventQueryError::UnknownAction(99))));
}
