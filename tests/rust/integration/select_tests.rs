use clickquery::{
    ast::{Expr, FromClause, OrderDirection, OrderExpr, SelectQuery},
    compile_select,
    config::CompilerConfig,
    errors::CompileError,
    query_planner::analyzer::errors::AnalyzerError,
};
use serde_json::json;

fn config(person_on_events: bool) -> CompilerConfig {
    CompilerConfig {
        team_id: 42,
        person_on_events,
        ..Default::default()
    }
}

fn select(fields: &[&str], table: &str) -> SelectQuery {
    SelectQuery {
        select: fields.iter().map(|f| Expr::field(f)).collect(),
        from: Some(FromClause {
            table: table.to_string(),
            alias: None,
        }),
        ..Default::default()
    }
}

#[test]
fn test_shared_join_is_created_once() {
    let compiled = compile_select(
        select(&["person.properties.name", "person.properties.email"], "events"),
        &config(false),
    )
    .unwrap();
    assert_eq!(compiled.sql.matches("AS events__pdi__person").count(), 1);
    assert_eq!(compiled.sql.matches("AS events__pdi ").count(), 1);
    assert!(compiled.sql.contains("AS properties___email"));
    assert!(compiled.sql.contains("AS properties___name"));
}

#[test]
fn test_output_is_deterministic() {
    let query = select(
        &["event", "group_2.group_properties.plan", "person.properties.$browser"],
        "events",
    );
    let first = compile_select(query.clone(), &config(false)).unwrap();
    let second = compile_select(query, &config(false)).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_multi_hop_matches_traverser() {
    let explicit = compile_select(select(&["pdi.person.id"], "events"), &config(false)).unwrap();
    let traversed = compile_select(select(&["person.id"], "events"), &config(false)).unwrap();
    assert_eq!(explicit, traversed);
}

#[test]
fn test_person_on_events_has_no_joins() {
    let compiled = compile_select(
        select(&["person_id", "person.properties.$browser", "person.created_at"], "events"),
        &config(true),
    )
    .unwrap();
    assert!(!compiled.sql.contains("JOIN"));
    assert!(compiled.sql.contains("person_created_at"));
}

#[test]
fn test_empty_groups_print_constants() {
    let mut query = select(&["event"], "events");
    query.where_clause = Some(Expr::Or(vec![Expr::And(vec![]), Expr::Or(vec![])]));
    let compiled = compile_select(query, &config(false)).unwrap();
    assert!(compiled.sql.contains("or(true, false)"));
}

#[test]
fn test_unknown_field_is_named() {
    let err = compile_select(select(&["event", "foo.bar"], "events"), &config(false)).unwrap_err();
    match err {
        CompileError::Analyzer(AnalyzerError::UnresolvableField { field, .. }) => {
            assert_eq!(field, "foo")
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_person_properties_from_distinct_ids() {
    let compiled = compile_select(
        select(&["person.properties.$browser"], "person_distinct_ids"),
        &config(false),
    )
    .unwrap();
    assert!(compiled.sql.contains("argMax(replaceRegexpAll(JSONExtractRaw(person.properties"));
    assert!(compiled.sql.contains("GROUP BY id"));
    assert!(compiled.sql.contains("WHERE equals(team_id, 42)"));
    assert!(compiled.sql.contains("AS person_distinct_ids__person"));
    assert_eq!(compiled.params.get("hogql_val_0"), Some(&json!("$browser")));
}

#[test]
fn test_order_and_limit_guards() {
    let mut query = select(&["event", "timestamp"], "events");
    query.order_by = vec![OrderExpr {
        expr: Expr::field("timestamp"),
        direction: OrderDirection::Desc,
    }];
    query.limit = Some(1_000_000);
    let compiled = compile_select(query, &config(false)).unwrap();
    assert!(compiled.sql.ends_with("ORDER BY timestamp DESC LIMIT 65535"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let bad = CompilerConfig {
        team_id: 0,
        ..Default::default()
    };
    let err = compile_select(select(&["event"], "events"), &bad).unwrap_err();
    assert!(matches!(err, CompileError::Config(_)));
}
