//! Static SQL checks
//!
//! Syntax/statement-kind validation of candidates and the deterministic
//! sample rewrite used for result comparison. No I/O.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, Query, SetExpr, Statement, TableFactor, TableWithJoins, Value};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::types::AgentErrorCode;

// =============================================================================
// Syntax Check
// =============================================================================

/// Why a candidate failed the static check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxFailure {
    Empty,
    Unparsable,
    MultipleStatements,
    NotSelect,
}

/// Result of the static parse of one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyntaxCheck {
    Ok,
    Failed { kind: SyntaxFailure, error: String },
}

impl SyntaxCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::Failed { error, .. } => Some(error),
        }
    }

    fn failed(kind: SyntaxFailure, error: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            error: error.into(),
        }
    }
}

fn parse(sql: &str) -> Result<Vec<Statement>, sqlparser::parser::ParserError> {
    Parser::parse_sql(&SQLiteDialect {}, sql)
}

/// Strip markdown fences, surrounding whitespace and trailing semicolons
/// from model output
pub fn normalize_sql(raw: &str) -> String {
    let mut sql = raw.trim();
    if let Some(rest) = sql.strip_prefix("```") {
        // drop the info string (`sql`, `sqlite`, ...) on the opening fence
        sql = rest.split_once('\n').map_or("", |(_, body)| body);
        sql = sql.trim_end().strip_suffix("```").unwrap_or(sql);
    }
    sql.trim().trim_end_matches(';').trim_end().to_string()
}

/// Check that `sql` is exactly one read-only SELECT statement
pub fn check_syntax(sql: &str) -> SyntaxCheck {
    if sql.trim().is_empty() {
        return SyntaxCheck::failed(SyntaxFailure::Empty, "Empty SQL");
    }

    let statements = match parse(sql) {
        Ok(statements) => statements,
        Err(e) => return SyntaxCheck::failed(SyntaxFailure::Unparsable, e.to_string()),
    };

    match statements.as_slice() {
        [] => SyntaxCheck::failed(SyntaxFailure::Empty, "Empty SQL"),
        [Statement::Query(query)] if is_read_only(query) => SyntaxCheck::Ok,
        [_] => SyntaxCheck::failed(
            SyntaxFailure::NotSelect,
            AgentErrorCode::OnlySelect.message(),
        ),
        _ => SyntaxCheck::failed(
            SyntaxFailure::MultipleStatements,
            format!(
                "Expected a single statement, found {}",
                statements.len()
            ),
        ),
    }
}

fn is_read_only(query: &Query) -> bool {
    let ctes_ok = query
        .with
        .as_ref()
        .is_none_or(|with| with.cte_tables.iter().all(|cte| is_read_only(&cte.query)));
    ctes_ok && is_read_only_body(&query.body)
}

fn is_read_only_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_body(left) && is_read_only_body(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

// =============================================================================
// Table References
// =============================================================================

/// Map of every name a FROM clause binds (alias or bare table) to the table it reads
///
/// Keys and values are lowercased. Covers CTE bodies, derived tables and set
/// operations; subqueries nested inside expressions are not visited.
pub fn table_aliases(sql: &str) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    if let Ok(statements) = parse(sql) {
        for statement in &statements {
            if let Statement::Query(query) = statement {
                collect_query(query, &mut aliases);
            }
        }
    }
    aliases
}

fn collect_query(query: &Query, out: &mut HashMap<String, String>) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            collect_query(&cte.query, out);
        }
    }
    collect_body(&query.body, out);
}

fn collect_body(body: &SetExpr, out: &mut HashMap<String, String>) {
    match body {
        SetExpr::Select(select) => {
            for twj in &select.from {
                collect_table_with_joins(twj, out);
            }
        }
        SetExpr::Query(query) => collect_query(query, out),
        SetExpr::SetOperation { left, right, .. } => {
            collect_body(left, out);
            collect_body(right, out);
        }
        _ => {}
    }
}

fn collect_table_with_joins(twj: &TableWithJoins, out: &mut HashMap<String, String>) {
    collect_factor(&twj.relation, out);
    for join in &twj.joins {
        collect_factor(&join.relation, out);
    }
}

fn collect_factor(factor: &TableFactor, out: &mut HashMap<String, String>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let Some(table) = name.0.last().map(|ident| ident.value.to_lowercase()) else {
                return;
            };
            if let Some(alias) = alias {
                out.insert(alias.name.value.to_lowercase(), table.clone());
            }
            out.insert(table.clone(), table);
        }
        TableFactor::Derived { subquery, .. } => collect_query(subquery, out),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_table_with_joins(table_with_joins, out),
        _ => {}
    }
}

// =============================================================================
// Deterministic Sample Rewrite
// =============================================================================

/// Output column count of the leftmost SELECT, if statically known
fn projection_width(body: &SetExpr) -> Option<usize> {
    match body {
        SetExpr::Select(select) => Some(select.projection.len()),
        SetExpr::Query(query) => projection_width(&query.body),
        SetExpr::SetOperation { left, .. } => projection_width(left),
        _ => None,
    }
}

fn literal_limit(query: &Query) -> Option<u64> {
    match &query.limit {
        Some(Expr::Value(Value::Number(n, _))) => n.parse().ok(),
        _ => None,
    }
}

/// `ORDER BY 1, .., width LIMIT cap` parsed into a query to graft from
fn template(width: Option<usize>, cap: u64) -> Option<Query> {
    let order = match width {
        Some(w) if w > 0 => format!(
            " ORDER BY {}",
            (1..=w).map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
        ),
        _ => String::new(),
    };
    let sql = format!("SELECT 1{} LIMIT {}", order, cap);
    match parse(&sql).ok()?.into_iter().next()? {
        Statement::Query(query) => Some(*query),
        _ => None,
    }
}

/// Rewrite `sql` into a capped, stably ordered sample query
///
/// - no ORDER BY: order by every output position
/// - LIMIT absent, non-literal, or above `cap`: set to `cap`
/// - already ordered with a literal LIMIT at or below `cap`: returned verbatim
///
/// Anything unparsable is returned unchanged; execution reports the error.
pub fn ensure_deterministic_sample(sql: &str, cap: u64) -> String {
    let mut query = match parse(sql) {
        Ok(statements) => match <[Statement; 1]>::try_from(statements) {
            Ok([Statement::Query(query)]) => *query,
            _ => return sql.to_string(),
        },
        Err(e) => {
            debug!("Sample rewrite skipped, parse failed: {}", e);
            return sql.to_string();
        }
    };

    let has_order = query.order_by.is_some();
    let limit_ok = literal_limit(&query).is_some_and(|limit| limit <= cap);
    if has_order && limit_ok {
        return sql.to_string();
    }

    let width = if has_order {
        None
    } else {
        projection_width(&query.body)
    };
    let Some(template) = template(width, cap) else {
        return sql.to_string();
    };

    if !has_order {
        query.order_by = template.order_by;
    }
    if !limit_ok {
        query.limit = template.limit;
    }

    query.to_string()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn rewrite_is_idempotent_for_generated_selects(
            cols in prop::collection::vec("c_[a-z]{1,6}", 1..5),
            limit in prop::option::of(1u64..500),
            cap in 1u64..100,
        ) {
            let mut sql = format!("SELECT {} FROM t", cols.join(", "));
            if let Some(limit) = limit {
                sql.push_str(&format!(" LIMIT {}", limit));
            }

            let once = ensure_deterministic_sample(&sql, cap);
            prop_assert!(check_syntax(&once).is_ok());
            prop_assert_eq!(ensure_deterministic_sample(&once, cap), once);
        }
    }
}
