use std::io::Write;

use clickquery::{
    ast::SelectQuery,
    compile_funnel, compile_select, compile_stickiness,
    config::CompilerConfig,
    event_query::{filters::Entity, funnel::FunnelRequest, stickiness::StickinessRequest},
};
use serde_json::json;

#[test]
fn test_select_from_json() {
    let query: SelectQuery = serde_json::from_value(json!({
        "select": [
            {"field": {"chain": ["event"]}},
            {"field": {"chain": ["pdi", "person_id"]}}
        ],
        "from": {"table": "events"},
        "limit": 10
    }))
    .unwrap();
    let config = CompilerConfig {
        team_id: 42,
        ..Default::default()
    };
    let compiled = compile_select(query, &config).unwrap();
    assert!(compiled.sql.starts_with("SELECT event, events__pdi.person_id FROM events INNER JOIN"));
    assert!(compiled.sql.ends_with("WHERE equals(team_id, 42) LIMIT 10"));
}

#[test]
fn test_funnel_request_from_json() {
    let request: FunnelRequest = serde_json::from_value(json!({
        "filter": {
            "date_from": "2024-01-01T00:00:00Z",
            "entities": [
                {"type": "events", "id": "$pageview"},
                {"type": "actions", "id": 3}
            ],
            "properties": {
                "type": "OR",
                "values": [
                    {"key": "$browser", "value": "Chrome", "type": "event"},
                    {"key": "industry", "value": "tech", "type": "group", "group_type_index": 0}
                ]
            }
        },
        "actions": [
            {"id": 3, "name": "signed up", "steps": [{"event": "$identify"}]}
        ],
        "extra_fields": ["uuid"],
        "entity_name": "funnel_events"
    }))
    .unwrap();
    assert_eq!(request.options.entity_name, "funnel_events");
    assert!(!request.options.skip_entity_filter);
    assert_eq!(request.filter.entities[1], Entity::action(3));

    let compiled = compile_funnel(&request, &CompilerConfig::default()).unwrap();
    assert!(compiled.sql.contains("e.uuid AS uuid"));
    assert!(compiled.sql.contains("LEFT JOIN"));
    assert!(compiled.sql.contains("AS groups_0 ON equals(e.`$group_0`, groups_0.group_key)"));
    assert_eq!(
        compiled.params.get("funnel_events"),
        Some(&json!(["$identify", "$pageview"]))
    );
    assert_eq!(compiled.params.get("date_from"), Some(&json!("2024-01-01 00:00:00")));
}

#[test]
fn test_stickiness_request_from_json() {
    let request: StickinessRequest = serde_json::from_value(json!({
        "filter": {"interval": "month", "sampling_factor": 0.25},
        "entity": {"type": "events", "id": "$pageview"}
    }))
    .unwrap();
    let compiled = compile_stickiness(&request, &CompilerConfig::default()).unwrap();
    assert!(compiled.sql.contains("toStartOfMonth("));
    assert!(compiled.sql.contains("SAMPLE %(sampling_factor)s"));
    assert_eq!(compiled.params.get("sampling_factor"), Some(&json!(0.25)));
}

#[test]
fn test_config_file_drives_compilation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "team_id: 9\nperson_on_events: true\ntimezone: Asia/Tokyo").unwrap();
    let config = CompilerConfig::from_yaml_file(file.path()).unwrap();

    let request: StickinessRequest = serde_json::from_value(json!({
        "filter": {},
        "entity": {"type": "events", "id": "$pageview"}
    }))
    .unwrap();
    let compiled = compile_stickiness(&request, &config).unwrap();
    assert!(compiled.sql.starts_with("SELECT e.person_id AS aggregation_target"));
    assert_eq!(compiled.params.get("team_id"), Some(&json!(9)));
    assert_eq!(compiled.params.get("timezone"), Some(&json!("Asia/Tokyo")));
}
