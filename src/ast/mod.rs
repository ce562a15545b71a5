//! Expression tree shared by every compilation pass.
//!
//! The tree is persistent: passes take nodes by value and return new ones.
//! A freshly parsed query only contains [`Expr::Field`] references; after lazy
//! table resolution every field has become an [`Expr::Column`] and the join
//! list of the [`SelectQuery`] holds the materialized lazy joins.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Unresolved dotted field reference, e.g. `pdi.person.properties.$browser`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Field {
    pub chain: Vec<String>,
}

impl Field {
    pub fn new<S: Into<String>>(chain: impl IntoIterator<Item = S>) -> Self {
        Field {
            chain: chain.into_iter().map(Into::into).collect(),
        }
    }

    pub fn path(&self) -> String {
        self.chain.join(".")
    }
}

/// Resolved column reference.
///
/// `table_alias` is `None` for columns of an unaliased base table. A non-empty
/// `json_path` extracts that key path out of a JSON string column.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table_alias: Option<String>,
    pub column: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_path: Vec<String>,
}

impl ColumnRef {
    pub fn new(table_alias: Option<&str>, column: &str) -> Self {
        ColumnRef {
            table_alias: table_alias.map(str::to_string),
            column: column.to_string(),
            json_path: vec![],
        }
    }

    pub fn with_json_path(mut self, path: Vec<String>) -> Self {
        self.json_path = path;
        self
    }
}

/// Literal value. Always printed as a bound parameter.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Constant {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    StringList(Vec<String>),
    NumberList(Vec<f64>),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Null => Value::Null,
            Constant::Integer(i) => Value::from(*i),
            Constant::Float(f) => Value::from(*f),
            Constant::String(s) => Value::from(s.as_str()),
            Constant::StringList(items) => Value::from(items.clone()),
            Constant::NumberList(items) => Value::from(items.clone()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    ILike,
    NotLike,
    NotILike,
    In,
    NotIn,
    Regex,
}

impl CompareOp {
    /// ClickHouse function rendering this comparison.
    pub fn function_name(&self) -> &'static str {
        match self {
            CompareOp::Eq => "equals",
            CompareOp::NotEq => "notEquals",
            CompareOp::Lt => "less",
            CompareOp::LtEq => "lessOrEquals",
            CompareOp::Gt => "greater",
            CompareOp::GtEq => "greaterOrEquals",
            CompareOp::Like => "like",
            CompareOp::ILike => "ilike",
            CompareOp::NotLike => "notLike",
            CompareOp::NotILike => "notILike",
            CompareOp::In => "in",
            CompareOp::NotIn => "notIn",
            CompareOp::Regex => "match",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    #[serde(default)]
    pub distinct: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CompareOperation {
    pub op: CompareOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub expr: Box<Expr>,
    pub alias: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Field(Field),
    Column(ColumnRef),
    Constant(Constant),
    /// Compiler-generated integer printed verbatim. Never built from user input.
    Inline(i64),
    /// Compiler-generated string literal, printed quoted.
    InlineString(String),
    /// Named parameter supplied by the caller, printed as `%(name)s`.
    Placeholder(String),
    Call(Call),
    Compare(CompareOperation),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Alias(Alias),
    /// Scalar or set sub-select, e.g. the right side of `in`.
    Subquery(Box<SelectQuery>),
}

impl Expr {
    pub fn field(path: &str) -> Self {
        Expr::Field(Field::new(path.split('.')))
    }

    pub fn column(table_alias: Option<&str>, column: &str) -> Self {
        Expr::Column(ColumnRef::new(table_alias, column))
    }

    pub fn string(value: &str) -> Self {
        Expr::Constant(Constant::String(value.to_string()))
    }

    pub fn placeholder(name: &str) -> Self {
        Expr::Placeholder(name.to_string())
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call(Call {
            name: name.to_string(),
            args,
            distinct: false,
        })
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare(CompareOperation {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Expr::compare(CompareOp::Eq, left, right)
    }

    pub fn alias(self, alias: &str) -> Self {
        Expr::Alias(Alias {
            expr: Box::new(self),
            alias: alias.to_string(),
        })
    }

    /// Conjunction that collapses trivial cases instead of printing `and(x)`.
    pub fn and(mut exprs: Vec<Expr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            Expr::And(exprs)
        }
    }

    /// Name the expression is selectable under, if any.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Expr::Alias(alias) => Some(&alias.alias),
            Expr::Column(col) if col.json_path.is_empty() => Some(&col.column),
            _ => None,
        }
    }

    /// Rebuild the tree bottom-up, letting `f` replace any node.
    pub fn try_transform<E, F>(self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        let rebuilt = match self {
            Expr::Call(call) => Expr::Call(Call {
                name: call.name,
                args: call
                    .args
                    .into_iter()
                    .map(|arg| arg.try_transform(f))
                    .collect::<Result<_, _>>()?,
                distinct: call.distinct,
            }),
            Expr::Compare(cmp) => Expr::Compare(CompareOperation {
                op: cmp.op,
                left: Box::new(cmp.left.try_transform(f)?),
                right: Box::new(cmp.right.try_transform(f)?),
            }),
            Expr::And(items) => Expr::And(
                items
                    .into_iter()
                    .map(|e| e.try_transform(f))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Or(items) => Expr::Or(
                items
                    .into_iter()
                    .map(|e| e.try_transform(f))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Not(inner) => Expr::Not(Box::new(inner.try_transform(f)?)),
            Expr::Alias(alias) => Expr::Alias(Alias {
                expr: Box::new(alias.expr.try_transform(f)?),
                alias: alias.alias,
            }),
            leaf => leaf,
        };
        f(rebuilt)
    }

    /// Visit every node, parents before children.
    pub fn walk<'a, F: FnMut(&'a Expr)>(&'a self, f: &mut F) {
        f(self);
        match self {
            Expr::Call(call) => call.args.iter().for_each(|arg| arg.walk(f)),
            Expr::Compare(cmp) => {
                cmp.left.walk(f);
                cmp.right.walk(f);
            }
            Expr::And(items) | Expr::Or(items) => items.iter().for_each(|e| e.walk(f)),
            Expr::Not(inner) => inner.walk(f),
            Expr::Alias(alias) => alias.expr.walk(f),
            _ => {}
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum JoinType {
    #[serde(rename = "INNER")]
    Inner,
    #[serde(rename = "LEFT")]
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Source of a FROM or JOIN clause.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    /// Physical table name, printed as-is.
    Table(String),
    Subquery(Box<SelectQuery>),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct JoinExpr {
    pub join_type: JoinType,
    pub source: TableSource,
    pub alias: String,
    pub constraint: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FromClause {
    /// Table name as written in the query (`events`, `person_distinct_ids`, ...).
    /// Resolution replaces it with the physical table name.
    pub table: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum OrderDirection {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrderExpr {
    pub expr: Expr,
    pub direction: OrderDirection,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct SelectQuery {
    pub select: Vec<Expr>,
    #[serde(default)]
    pub from: Option<FromClause>,
    #[serde(default)]
    pub sample: Option<Expr>,
    #[serde(default)]
    pub joins: Vec<JoinExpr>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default)]
    pub having: Option<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderExpr>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl SelectQuery {
    /// Every top-level expression of the statement, joins excluded.
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.select
            .iter()
            .chain(self.sample.iter())
            .chain(self.where_clause.iter())
            .chain(self.group_by.iter())
            .chain(self.having.iter())
            .chain(self.order_by.iter().map(|o| &o.expr))
    }

    /// Add `expr` to the WHERE clause with AND.
    pub fn add_filter(&mut self, expr: Expr) {
        self.where_clause = Some(match self.where_clause.take() {
            None => expr,
            Some(Expr::And(mut items)) => {
                items.push(expr);
                Expr::And(items)
            }
            Some(existing) => Expr::And(vec![existing, expr]),
        });
    }
}
