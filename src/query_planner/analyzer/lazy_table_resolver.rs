//! Lazy table resolution.
//!
//! Rewrites every dotted field reference of a query into a column reference,
//! creating the joins the reference needs along the way:
//!
//! ```text
//! select event, pdi.person.properties.$browser from events
//!
//! events --pdi--> events__pdi --person--> events__pdi__person
//!                 (person_id)             (properties___$browser)
//!
//! SELECT event, events__pdi__person.`properties___$browser` FROM events
//!   INNER JOIN (...) AS events__pdi ON equals(events.distinct_id, events__pdi.distinct_id)
//!   INNER JOIN (...) AS events__pdi__person
//!     ON equals(events__pdi.person_id, events__pdi__person.id)
//! ```
//!
//! Each join exists once per query no matter how many references go through
//! it; its SELECT list is the union of the fields requested through it.

use std::collections::HashSet;

use crate::{
    ast::{ColumnRef, Expr, Field, FromClause, OrderExpr, SelectQuery},
    query_planner::{
        analyzer::{
            analyzer_pass::{AnalyzerPass, AnalyzerResult},
            errors::{AnalyzerError, Pass},
            join_registry::{JoinKey, JoinRegistry, RequestOrigin},
        },
        column_optimizer::ColumnOptimizer,
        plan_ctx::PlanCtx,
        transformed::Transformed,
    },
    table_catalog::{
        lookup_table, table_schema, tables::find_field, FieldDef, JoinContext, LazyJoin,
        RequestedField, TableSchema,
    },
};

/// Traverser expansions allowed for a single reference before giving up.
const MAX_TRAVERSALS: usize = 8;

pub struct LazyTableResolver;

impl AnalyzerPass for LazyTableResolver {
    fn analyze(
        &self,
        query: SelectQuery,
        plan_ctx: &mut PlanCtx,
    ) -> AnalyzerResult<Transformed<SelectQuery>> {
        let from = query.from.clone().ok_or(AnalyzerError::MissingFromTable {
            pass: Pass::LazyTableResolver,
        })?;
        if !query.joins.is_empty() {
            return Err(AnalyzerError::ExplicitJoinsUnsupported {
                pass: Pass::LazyTableResolver,
            });
        }

        let schema = lookup_table(&from.table)?;

        let base = BaseTable {
            schema,
            query_name: from.table.clone(),
            alias: from.alias.clone(),
        };
        let mut resolution = Resolution {
            base: &base,
            person_on_events: plan_ctx.person_on_events(),
            select_aliases: query
                .select
                .iter()
                .filter_map(|expr| match expr {
                    Expr::Alias(alias) => Some(alias.alias.clone()),
                    _ => None,
                })
                .collect(),
            registry: JoinRegistry::new(),
            resolved_fields: 0,
        };

        let SelectQuery {
            select,
            sample,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            ..
        } = query;

        let mut resolved = SelectQuery {
            select: resolution.rewrite_select(select)?,
            from: Some(FromClause {
                table: schema.kind.clickhouse_name().to_string(),
                alias: from.alias,
            }),
            sample: resolution.rewrite_opt(sample)?,
            joins: vec![],
            where_clause: resolution.rewrite_opt(where_clause)?,
            group_by: resolution.rewrite_all(group_by)?,
            having: resolution.rewrite_opt(having)?,
            order_by: order_by
                .into_iter()
                .map(|item| {
                    Ok(OrderExpr {
                        expr: resolution.rewrite(item.expr)?,
                        direction: item.direction,
                    })
                })
                .collect::<AnalyzerResult<_>>()?,
            limit,
        };

        let mut optimizer = ColumnOptimizer::new();
        optimizer.observe_select(&resolved, schema.kind.name());

        let join_ctx = JoinContext {
            team_filter: Expr::Inline(plan_ctx.team_id()),
        };
        resolved.joins = resolution.registry.materialize(&join_ctx, &optimizer)?;

        log::debug!(
            "LazyTableResolver: resolved {} field(s) on {} with {} join(s)",
            resolution.resolved_fields,
            base.query_name,
            resolved.joins.len()
        );

        if resolution.resolved_fields > 0 {
            Ok(Transformed::Yes(resolved))
        } else {
            Ok(Transformed::No(resolved))
        }
    }
}

/// Input queries reference data through fields and constants only. Columns,
/// sub-selects and bound placeholders would bypass resolution and the team
/// guard.
fn reject_resolved_nodes(expr: &Expr) -> AnalyzerResult<()> {
    let mut found: Option<String> = None;
    expr.walk(&mut |node| {
        if found.is_some() {
            return;
        }
        found = match node {
            Expr::Column(column) => Some(format!("column '{}'", column.column)),
            Expr::Subquery(_) => Some("sub-select".to_string()),
            Expr::Placeholder(name) => Some(format!("placeholder '{}'", name)),
            Expr::Inline(_) | Expr::InlineString(_) => Some("inline literal".to_string()),
            _ => None,
        };
    });
    match found {
        Some(node) => Err(AnalyzerError::ResolvedNodeInInput {
            pass: Pass::LazyTableResolver,
            node,
        }),
        None => Ok(()),
    }
}

struct BaseTable {
    schema: &'static TableSchema,
    query_name: String,
    alias: Option<String>,
}

impl BaseTable {
    /// Root of generated join aliases.
    fn join_prefix(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.query_name)
    }

    /// Qualifier for base columns inside ON clauses.
    fn on_qualifier(&self) -> &str {
        self.alias
            .as_deref()
            .unwrap_or(self.schema.kind.clickhouse_name())
    }

    fn is_prefix(&self, segment: &str) -> bool {
        match &self.alias {
            Some(alias) => alias == segment,
            None => self.query_name == segment,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Base,
    Join(usize),
}

struct Resolution<'a> {
    base: &'a BaseTable,
    person_on_events: bool,
    select_aliases: HashSet<String>,
    registry: JoinRegistry,
    resolved_fields: usize,
}

impl Resolution<'_> {
    fn rewrite(&mut self, expr: Expr) -> AnalyzerResult<Expr> {
        reject_resolved_nodes(&expr)?;
        expr.try_transform(&mut |node| match node {
            Expr::Field(field) => {
                let resolved = self.resolve_field(&field)?;
                self.resolved_fields += 1;
                Ok(resolved)
            }
            other => Ok(other),
        })
    }

    /// An alias never stands for a field inside its own definition, so
    /// `person_id AS person_id` still resolves the catalog field.
    fn rewrite_select(&mut self, select: Vec<Expr>) -> AnalyzerResult<Vec<Expr>> {
        select
            .into_iter()
            .map(|expr| {
                let own = match &expr {
                    Expr::Alias(alias) => Some(alias.alias.clone()),
                    _ => None,
                };
                let shadowed = own.as_ref().is_some_and(|name| self.select_aliases.remove(name));
                let rewritten = self.rewrite(expr);
                if let (true, Some(name)) = (shadowed, own) {
                    self.select_aliases.insert(name);
                }
                rewritten
            })
            .collect()
    }

    fn rewrite_all(&mut self, exprs: Vec<Expr>) -> AnalyzerResult<Vec<Expr>> {
        exprs.into_iter().map(|e| self.rewrite(e)).collect()
    }

    fn rewrite_opt(&mut self, expr: Option<Expr>) -> AnalyzerResult<Option<Expr>> {
        expr.map(|e| self.rewrite(e)).transpose()
    }

    /// Walk the chain left to right against the current table's field set.
    fn resolve_field(&mut self, field: &Field) -> AnalyzerResult<Expr> {
        let path = field.path();
        let mut chain = field.chain.clone();

        if chain.len() == 1 && self.select_aliases.contains(&chain[0]) {
            return Ok(Expr::column(None, &chain[0]));
        }
        if chain.len() > 1 && self.base.is_prefix(&chain[0]) {
            chain.remove(0);
        }

        let mut scope = Scope::Base;
        let mut table = self.base.schema.kind;
        let mut fields = self.base.schema.fields(self.person_on_events);
        let mut join_start = 0;
        let mut traversals = 0;
        let mut i = 0;

        loop {
            let name = chain.get(i).cloned().unwrap_or_default();
            let def = find_field(fields, &name).ok_or_else(|| AnalyzerError::UnresolvableField {
                path: path.clone(),
                field: name.clone(),
                table: table.name().to_string(),
            })?;

            match def {
                FieldDef::Column(column) => {
                    if i + 1 < chain.len() {
                        return Err(AnalyzerError::PropertyPathOnColumn { path, column: name });
                    }
                    return Ok(self.column(scope, column, &chain[join_start..], vec![]));
                }
                FieldDef::Json(column) => {
                    let json_path = chain[i + 1..].to_vec();
                    return Ok(self.column(scope, column, &chain[join_start..], json_path));
                }
                FieldDef::Traverser(target) => {
                    traversals += 1;
                    if traversals > MAX_TRAVERSALS {
                        return Err(AnalyzerError::TraversalCycle {
                            pass: Pass::LazyTableResolver,
                            path,
                        });
                    }
                    chain.splice(i..=i, target.iter().map(|s| s.to_string()));
                }
                FieldDef::Virtual(inner) => {
                    if i + 1 == chain.len() {
                        return Err(AnalyzerError::LazyTableNotSelectable { path });
                    }
                    fields = inner;
                    i += 1;
                }
                FieldDef::LazyJoin(spec) => {
                    if i + 1 == chain.len() {
                        return Err(AnalyzerError::LazyTableNotSelectable { path });
                    }
                    let index = self.join(scope, &name, spec)?;
                    scope = Scope::Join(index);
                    table = spec.join_table;
                    fields = table_schema(table).fields(self.person_on_events);
                    i += 1;
                    join_start = i;
                }
            }
        }
    }

    /// Reference to a column reached in `scope`. Columns of joined tables are
    /// requested from the join under their flattened name.
    fn column(
        &mut self,
        scope: Scope,
        physical: &str,
        join_path: &[String],
        json_path: Vec<String>,
    ) -> Expr {
        match scope {
            Scope::Base => Expr::Column(
                ColumnRef::new(self.base.alias.as_deref(), physical).with_json_path(json_path),
            ),
            Scope::Join(index) => {
                let requested = RequestedField::from_path(join_path.to_vec());
                let column = requested.output.clone();
                self.registry.request(index, requested, RequestOrigin::Query);
                Expr::column(Some(&self.registry.node(index).alias), &column)
            }
        }
    }

    fn join(&mut self, scope: Scope, field: &str, spec: LazyJoin) -> AnalyzerResult<usize> {
        let (parent_alias, parent_key) = match scope {
            Scope::Base => (
                self.base.join_prefix().to_string(),
                Expr::column(Some(self.base.on_qualifier()), spec.from_field),
            ),
            Scope::Join(parent) => {
                self.registry.request(
                    parent,
                    RequestedField::from_path(vec![spec.from_field.to_string()]),
                    RequestOrigin::ChildJoin,
                );
                let alias = self.registry.node(parent).alias.clone();
                let key = Expr::column(Some(&alias), spec.from_field);
                (alias, key)
            }
        };

        self.registry.get_or_create(
            JoinKey {
                table: spec.join_table,
                parent_alias,
                field: field.to_string(),
            },
            spec,
            parent_key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TableSource;

    fn resolve(
        select: &[&str],
        table: &str,
        person_on_events: bool,
    ) -> AnalyzerResult<SelectQuery> {
        let query = SelectQuery {
            select: select.iter().map(|path| Expr::field(path)).collect(),
            from: Some(FromClause {
                table: table.to_string(),
                alias: None,
            }),
            ..Default::default()
        };
        let mut plan_ctx = PlanCtx::new(42, person_on_events, 65535);
        Ok(LazyTableResolver.analyze(query, &mut plan_ctx)?.get_plan())
    }

    fn join_aliases(query: &SelectQuery) -> Vec<&str> {
        query.joins.iter().map(|j| j.alias.as_str()).collect()
    }

    fn subquery_outputs(query: &SelectQuery, index: usize) -> Vec<&str> {
        match &query.joins[index].source {
            TableSource::Subquery(subquery) => subquery
                .select
                .iter()
                .filter_map(|e| e.output_name())
                .collect(),
            TableSource::Table(_) => vec![],
        }
    }

    #[test]
    fn test_plain_columns_need_no_join() {
        let query = resolve(&["event", "properties.$browser"], "events", false).unwrap();
        assert!(query.joins.is_empty());
        assert_eq!(query.select[0], Expr::column(None, "event"));
        assert_eq!(
            query.select[1],
            Expr::Column(
                ColumnRef::new(None, "properties").with_json_path(vec!["$browser".to_string()])
            )
        );
    }

    #[test]
    fn test_traversed_person_id() {
        let query = resolve(&["event", "person_id"], "events", false).unwrap();
        assert_eq!(join_aliases(&query), vec!["events__pdi"]);
        assert_eq!(query.select[1], Expr::column(Some("events__pdi"), "person_id"));
        assert_eq!(subquery_outputs(&query, 0), vec!["person_id", "distinct_id"]);
    }

    #[test]
    fn test_two_hops_share_first_join() {
        let query = resolve(&["pdi.person_id", "pdi.person.id", "person.id"], "events", false).unwrap();
        assert_eq!(join_aliases(&query), vec!["events__pdi", "events__pdi__person"]);
        assert_eq!(query.select[1], query.select[2]);
        assert_eq!(subquery_outputs(&query, 1), vec!["id"]);
    }

    #[test]
    fn test_properties_are_folded_into_one_join() {
        let query = resolve(
            &["person.properties.name", "pdi.person.properties.name", "person.properties.email"],
            "events",
            false,
        )
        .unwrap();
        assert_eq!(query.joins.len(), 2);
        assert_eq!(
            subquery_outputs(&query, 1),
            vec!["properties___name", "properties___email", "id"]
        );
        assert_eq!(
            query.select[0],
            Expr::column(Some("events__pdi__person"), "properties___name")
        );
    }

    #[test]
    fn test_person_on_events_never_joins() {
        let query = resolve(
            &["person_id", "pdi.person_id", "person.id", "pdi.person.properties.$browser", "person.created_at"],
            "events",
            true,
        )
        .unwrap();
        assert!(query.joins.is_empty());
        assert_eq!(query.select[0], Expr::column(None, "person_id"));
        assert_eq!(query.select[1], Expr::column(None, "person_id"));
        assert_eq!(query.select[2], Expr::column(None, "person_id"));
        assert_eq!(
            query.select[3],
            Expr::Column(
                ColumnRef::new(None, "person_properties").with_json_path(vec!["$browser".to_string()])
            )
        );
        assert_eq!(query.select[4], Expr::column(None, "person_created_at"));
    }

    #[test]
    fn test_person_on_events_keeps_other_tables_lazy() {
        let query = resolve(&["person.id"], "person_distinct_ids", true).unwrap();
        assert_eq!(join_aliases(&query), vec!["person_distinct_ids__person"]);
    }

    #[test]
    fn test_group_join() {
        let query = resolve(&["group_0.group_properties.name"], "events", false).unwrap();
        assert_eq!(join_aliases(&query), vec!["events__group_0"]);
        assert_eq!(subquery_outputs(&query, 0), vec!["group_properties___name", "group_key"]);
        assert_eq!(
            query.joins[0].constraint,
            Expr::equals(
                Expr::column(Some("events"), "$group_0"),
                Expr::column(Some("events__group_0"), "group_key"),
            )
        );
    }

    #[test]
    fn test_unknown_field() {
        let err = resolve(&["event", "foo.bar"], "events", false).unwrap_err();
        assert_eq!(
            err,
            AnalyzerError::UnresolvableField {
                path: "foo.bar".to_string(),
                field: "foo".to_string(),
                table: "events".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_field_on_joined_table() {
        let err = resolve(&["pdi.person.nope"], "events", false).unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::UnresolvableField { field, table, .. } if field == "nope" && table == "persons"
        ));
    }

    #[test]
    fn test_unknown_table() {
        let err = resolve(&["event"], "sessions", false).unwrap_err();
        assert!(matches!(err, AnalyzerError::Catalog(_)));
    }

    #[test]
    fn test_lazy_table_is_not_a_value() {
        assert_eq!(
            resolve(&["pdi"], "events", false).unwrap_err(),
            AnalyzerError::LazyTableNotSelectable {
                path: "pdi".to_string()
            }
        );
        assert!(matches!(
            resolve(&["person"], "events", true),
            Err(AnalyzerError::LazyTableNotSelectable { .. })
        ));
    }

    #[test]
    fn test_path_past_plain_column() {
        assert!(matches!(
            resolve(&["event.name"], "events", false),
            Err(AnalyzerError::PropertyPathOnColumn { column, .. }) if column == "event"
        ));
    }

    #[test]
    fn test_table_prefix_and_select_alias() {
        let query = SelectQuery {
            select: vec![Expr::field("e.event").alias("name")],
            from: Some(FromClause {
                table: "events".to_string(),
                alias: Some("e".to_string()),
            }),
            order_by: vec![OrderExpr {
                expr: Expr::field("name"),
                direction: crate::ast::OrderDirection::Asc,
            }],
            ..Default::default()
        };
        let mut plan_ctx = PlanCtx::new(1, false, 100);
        let query = LazyTableResolver.analyze(query, &mut plan_ctx).unwrap().get_plan();
        assert_eq!(query.select[0], Expr::column(Some("e"), "event").alias("name"));
        assert_eq!(query.order_by[0].expr, Expr::column(None, "name"));
    }

    #[test]
    fn test_alias_does_not_shadow_its_own_field() {
        let query = SelectQuery {
            select: vec![Expr::field("person_id").alias("person_id")],
            from: Some(FromClause {
                table: "events".to_string(),
                alias: None,
            }),
            where_clause: Some(Expr::equals(Expr::field("person_id"), Expr::string("x"))),
            ..Default::default()
        };
        let mut plan_ctx = PlanCtx::new(1, false, 100);
        let query = LazyTableResolver.analyze(query, &mut plan_ctx).unwrap().get_plan();
        assert_eq!(
            query.select[0],
            Expr::column(Some("events__pdi"), "person_id").alias("person_id")
        );
        assert_eq!(join_aliases(&query), vec!["events__pdi"]);
        // outside its definition the alias is still a valid reference
        assert_eq!(
            query.where_clause,
            Some(Expr::equals(Expr::column(None, "person_id"), Expr::string("x")))
        );
    }

    #[test]
    fn test_resolved_nodes_are_rejected_in_input() {
        let subquery = SelectQuery {
            select: vec![Expr::field("distinct_id")],
            from: Some(FromClause {
                table: "person_distinct_id2".to_string(),
                alias: None,
            }),
            ..Default::default()
        };
        let cases = vec![
            (Expr::column(Some("x"), "secret"), "column 'secret'"),
            (
                Expr::compare(
                    crate::ast::CompareOp::In,
                    Expr::field("distinct_id"),
                    Expr::Subquery(Box::new(subquery)),
                ),
                "sub-select",
            ),
            (Expr::placeholder("team_id"), "placeholder 'team_id'"),
            (Expr::Inline(1), "inline literal"),
        ];
        for (expr, node) in cases {
            let query = SelectQuery {
                select: vec![Expr::field("event")],
                from: Some(FromClause {
                    table: "events".to_string(),
                    alias: None,
                }),
                where_clause: Some(expr),
                ..Default::default()
            };
            let mut plan_ctx = PlanCtx::new(1, false, 100);
            let err = LazyTableResolver.analyze(query, &mut plan_ctx).unwrap_err();
            assert_eq!(
                err,
                AnalyzerError::ResolvedNodeInInput {
                    pass: Pass::LazyTableResolver,
                    node: node.to_string(),
                }
            );
        }
    }

    #[test]
    fn test_aliased_base_prefixes_joins() {
        let query = SelectQuery {
            select: vec![Expr::field("person_id")],
            from: Some(FromClause {
                table: "events".to_string(),
                alias: Some("e".to_string()),
            }),
            ..Default::default()
        };
        let mut plan_ctx = PlanCtx::new(1, false, 100);
        let query = LazyTableResolver.analyze(query, &mut plan_ctx).unwrap().get_plan();
        assert_eq!(join_aliases(&query), vec!["e__pdi"]);
        assert_eq!(
            query.joins[0].constraint,
            Expr::equals(
                Expr::column(Some("e"), "distinct_id"),
                Expr::column(Some("e__pdi"), "distinct_id"),
            )
        );
    }

    #[test]
    fn test_every_catalog_path_gets_a_distinct_alias() {
        let query = resolve(
            &[
                "pdi.person_id",
                "pdi.person.id",
                "group_0.group_key",
                "group_1.group_key",
                "group_2.group_key",
                "group_3.group_key",
                "group_4.group_key",
            ],
            "events",
            false,
        )
        .unwrap();
        let aliases: HashSet<&str> = join_aliases(&query).into_iter().collect();
        assert_eq!(aliases.len(), query.joins.len());
        assert_eq!(query.joins.len(), 7);
    }
}
