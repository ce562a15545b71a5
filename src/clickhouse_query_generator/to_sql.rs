use super::common::{escape_identifier, escape_string};
use super::errors::PrinterError;
use super::params::{placeholder, ParamMap};
use crate::ast::{ColumnRef, Expr, JoinExpr, OrderDirection, SelectQuery, TableSource};

use regex::Regex;
use std::sync::LazyLock;

static FUNCTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("function pattern is valid"));

/// Pattern stripping the quotes `JSONExtractRaw` leaves around string values.
const JSON_QUOTES_PATTERN: &str = r#"^"|"$"#;

/// Renders resolved ASTs as single-line ClickHouse SQL.
///
/// Literals never reach the SQL text: every [`Expr::Constant`] is bound in the
/// parameter map and printed as its placeholder, in printing order.
pub struct ClickHousePrinter<'a> {
    params: &'a mut ParamMap,
}

impl<'a> ClickHousePrinter<'a> {
    pub fn new(params: &'a mut ParamMap) -> Self {
        ClickHousePrinter { params }
    }

    pub fn print_select(&mut self, query: &SelectQuery) -> Result<String, PrinterError> {
        if query.select.is_empty() {
            return Err(PrinterError::EmptySelect);
        }

        let mut parts = Vec::new();
        parts.push(format!("SELECT {}", self.print_list(&query.select)?));

        if let Some(from) = &query.from {
            let mut clause = format!("FROM {}", escape_identifier(&from.table));
            if let Some(alias) = &from.alias {
                clause.push_str(&format!(" AS {}", escape_identifier(alias)));
            }
            parts.push(clause);
        }
        if let Some(sample) = &query.sample {
            parts.push(format!("SAMPLE {}", self.print_expr(sample)?));
        }
        for join in &query.joins {
            parts.push(self.print_join(join)?);
        }
        if let Some(where_clause) = &query.where_clause {
            parts.push(format!("WHERE {}", self.print_expr(where_clause)?));
        }
        if !query.group_by.is_empty() {
            parts.push(format!("GROUP BY {}", self.print_list(&query.group_by)?));
        }
        if let Some(having) = &query.having {
            parts.push(format!("HAVING {}", self.print_expr(having)?));
        }
        if !query.order_by.is_empty() {
            let items = query
                .order_by
                .iter()
                .map(|item| {
                    let direction = match item.direction {
                        OrderDirection::Asc => "ASC",
                        OrderDirection::Desc => "DESC",
                    };
                    Ok(format!("{} {}", self.print_expr(&item.expr)?, direction))
                })
                .collect::<Result<Vec<_>, PrinterError>>()?;
            parts.push(format!("ORDER BY {}", items.join(", ")));
        }
        if let Some(limit) = query.limit {
            parts.push(format!("LIMIT {}", limit));
        }

        Ok(parts.join(" "))
    }

    pub fn print_join(&mut self, join: &JoinExpr) -> Result<String, PrinterError> {
        let source = match &join.source {
            TableSource::Table(name) => escape_identifier(name),
            TableSource::Subquery(subquery) => format!("({})", self.print_select(subquery)?),
        };
        Ok(format!(
            "{} {} AS {} ON {}",
            join.join_type,
            source,
            escape_identifier(&join.alias),
            self.print_expr(&join.constraint)?
        ))
    }

    pub fn print_expr(&mut self, expr: &Expr) -> Result<String, PrinterError> {
        match expr {
            Expr::Field(field) => Err(PrinterError::UnresolvedField(field.path())),
            Expr::Column(column) => self.print_column(column),
            Expr::Constant(constant) => Ok(self.params.add_value(constant.to_value())),
            Expr::Inline(value) => Ok(value.to_string()),
            Expr::InlineString(value) => Ok(escape_string(value)),
            Expr::Placeholder(name) => Ok(placeholder(name)),
            Expr::Call(call) => {
                if !FUNCTION_NAME.is_match(&call.name) {
                    return Err(PrinterError::InvalidFunctionName(call.name.clone()));
                }
                let args = self.print_list(&call.args)?;
                if call.distinct {
                    Ok(format!("{}(DISTINCT {})", call.name, args))
                } else {
                    Ok(format!("{}({})", call.name, args))
                }
            }
            Expr::Compare(cmp) => Ok(format!(
                "{}({}, {})",
                cmp.op.function_name(),
                self.print_expr(&cmp.left)?,
                self.print_expr(&cmp.right)?
            )),
            Expr::And(items) => self.print_boolean("and", items, "true"),
            Expr::Or(items) => self.print_boolean("or", items, "false"),
            Expr::Not(inner) => Ok(format!("not({})", self.print_expr(inner)?)),
            Expr::Alias(alias) => Ok(format!(
                "{} AS {}",
                self.print_expr(&alias.expr)?,
                escape_identifier(&alias.alias)
            )),
            Expr::Subquery(subquery) => Ok(format!("({})", self.print_select(subquery)?)),
        }
    }

    /// `and`/`or` with their identities for zero operands; one operand prints bare.
    fn print_boolean(
        &mut self,
        function: &str,
        items: &[Expr],
        identity: &str,
    ) -> Result<String, PrinterError> {
        match items {
            [] => Ok(identity.to_string()),
            [single] => self.print_expr(single),
            _ => Ok(format!("{}({})", function, self.print_list(items)?)),
        }
    }

    fn print_column(&mut self, column: &ColumnRef) -> Result<String, PrinterError> {
        let name = match &column.table_alias {
            Some(alias) => format!(
                "{}.{}",
                escape_identifier(alias),
                escape_identifier(&column.column)
            ),
            None => escape_identifier(&column.column),
        };
        if column.json_path.is_empty() {
            return Ok(name);
        }

        let mut args = vec![name];
        for key in &column.json_path {
            args.push(self.params.add_value(key.as_str().into()));
        }
        Ok(format!(
            "replaceRegexpAll(JSONExtractRaw({}), {}, '')",
            args.join(", "),
            escape_string(JSON_QUOTES_PATTERN)
        ))
    }

    fn print_list(&mut self, exprs: &[Expr]) -> Result<String, PrinterError> {
        let printed = exprs
            .iter()
            .map(|e| self.print_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(printed.join(", "))
    }
}
