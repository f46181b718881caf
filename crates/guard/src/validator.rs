//! SQL validation against a SELECT-only policy.
//!
//! Layers, each able to add rejection reasons independently:
//!
//! 1. Parse (syntax well-formedness)
//! 2. Statement-type allowlist (only SELECT)
//! 3. Destructive-keyword blocklist over the token stream
//! 4. Structural limits (JOIN count, nested subquery count)
//!
//! Layers 2 and 3 overlap on purpose: a parser can be tricked into
//! classifying a statement as SELECT while a mutating keyword rides along,
//! so the token scan runs even when the type check already passed — and
//! even when parsing failed outright.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, JoinConstraint,
    JoinOperator, Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::fmt;

/// Keywords that are never allowed in a validated query, regardless of what
/// the parser made of the statement.
const BLOCKED_KEYWORDS: [&str; 14] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "MERGE",
    "UPSERT", "GRANT", "REVOKE", "EXEC", "EXECUTE",
];

/// Structural complexity limits for a single query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SqlLimits {
    /// Maximum JOIN clauses
    pub max_joins: usize,

    /// Maximum nested SELECT subqueries
    pub max_subqueries: usize,
}

impl Default for SqlLimits {
    fn default() -> Self {
        Self {
            max_joins: 3,
            max_subqueries: 5,
        }
    }
}

/// The top-level statement classification of a SQL fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Alter,
    Create,
    Truncate,
    Grant,
    Revoke,
    /// Anything else, including unparseable input
    Other,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Drop => "DROP",
            Self::Alter => "ALTER",
            Self::Create => "CREATE",
            Self::Truncate => "TRUNCATE",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Other => "OTHER",
        };
        write!(f, "{name}")
    }
}

/// The outcome of validating one SQL fragment.
///
/// Immutable once produced. `accepted` implies: statement kind is SELECT,
/// both structural counts are within limits, and `reasons` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Whether the fragment passed every layer
    pub accepted: bool,

    /// Canonical reformatted query text, present only on acceptance
    pub canonical: Option<String>,

    /// Top-level statement classification
    pub statement_kind: StatementKind,

    /// JOIN clauses counted across the whole query tree
    pub join_count: usize,

    /// Nested SELECT subqueries counted across the whole query tree
    pub subquery_count: usize,

    /// Rejection reasons in layer order, empty iff accepted
    pub reasons: Vec<String>,
}

/// Validate one SQL fragment against the policy.
///
/// Pure function of `(sql, limits)`: identical inputs always produce an
/// identical verdict. Multi-statement input is classified and measured by its
/// first statement; the keyword scan covers the entire token stream, so a
/// trailing smuggled statement is still caught.
pub fn validate(sql: &str, limits: &SqlLimits) -> ValidationVerdict {
    let mut reasons = Vec::new();
    let dialect = GenericDialect {};

    let statements = match Parser::parse_sql(&dialect, sql) {
        Ok(stmts) if !stmts.is_empty() => Some(stmts),
        Ok(_) => {
            reasons.push("unparseable syntax: empty statement".to_string());
            None
        }
        Err(e) => {
            reasons.push(format!("unparseable syntax: {e}"));
            None
        }
    };

    let statement_kind = statements
        .as_deref()
        .map(|stmts| classify(&stmts[0], sql))
        .unwrap_or(StatementKind::Other);

    if statements.is_some() && statement_kind != StatementKind::Select {
        reasons.push(format!(
            "only SELECT statements are allowed, got: {statement_kind}"
        ));
    }

    for keyword in scan_blocked_keywords(sql) {
        reasons.push(format!("blocked keyword: {keyword}"));
    }

    let (join_count, subquery_count) = match statements.as_deref().map(|stmts| &stmts[0]) {
        Some(Statement::Query(query)) => count_structures(query),
        _ => (0, 0),
    };

    if join_count > limits.max_joins {
        reasons.push(format!(
            "too many joins: {join_count} (max: {})",
            limits.max_joins
        ));
    }
    if subquery_count > limits.max_subqueries {
        reasons.push(format!(
            "too many subqueries: {subquery_count} (max: {})",
            limits.max_subqueries
        ));
    }

    let accepted = reasons.is_empty();
    let canonical = if accepted {
        statements.as_deref().map(|stmts| stmts[0].to_string())
    } else {
        None
    };

    ValidationVerdict {
        accepted,
        canonical,
        statement_kind,
        join_count,
        subquery_count,
        reasons,
    }
}

/// Derive the top-level statement kind from the parsed statement.
///
/// The parser has far more statement variants than this policy cares about;
/// anything not matched explicitly falls back to classification by leading
/// keyword token.
fn classify(statement: &Statement, sql: &str) -> StatementKind {
    match statement {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(_) | SetExpr::Query(_) | SetExpr::SetOperation { .. } => {
                StatementKind::Select
            }
            _ => StatementKind::Other,
        },
        Statement::Insert(_) => StatementKind::Insert,
        Statement::Update { .. } => StatementKind::Update,
        Statement::Delete(_) => StatementKind::Delete,
        Statement::Drop { .. } => StatementKind::Drop,
        Statement::Truncate { .. } => StatementKind::Truncate,
        _ => classify_by_leading_keyword(sql),
    }
}

fn classify_by_leading_keyword(sql: &str) -> StatementKind {
    let dialect = GenericDialect {};
    let Ok(tokens) = Tokenizer::new(&dialect, sql).tokenize() else {
        return StatementKind::Other;
    };
    for token in tokens {
        if let Token::Word(word) = token {
            return match word.value.to_uppercase().as_str() {
                "SELECT" => StatementKind::Select,
                "INSERT" => StatementKind::Insert,
                "UPDATE" => StatementKind::Update,
                "DELETE" => StatementKind::Delete,
                "DROP" => StatementKind::Drop,
                "ALTER" => StatementKind::Alter,
                "CREATE" => StatementKind::Create,
                "TRUNCATE" => StatementKind::Truncate,
                "GRANT" => StatementKind::Grant,
                "REVOKE" => StatementKind::Revoke,
                _ => StatementKind::Other,
            };
        }
    }
    StatementKind::Other
}

/// Scan the token stream for blocklisted keywords.
///
/// Word-boundary aware by construction (the tokenizer yields whole words) and
/// blind to string literals and comments, which are separate token kinds.
/// When the tokenizer itself refuses the input, a plain word scan over the
/// raw text takes over so broken input cannot slip a keyword through.
fn scan_blocked_keywords(sql: &str) -> Vec<String> {
    let dialect = GenericDialect {};
    let mut found: Vec<String> = Vec::new();

    match Tokenizer::new(&dialect, sql).tokenize() {
        Ok(tokens) => {
            for token in tokens {
                if let Token::Word(word) = token {
                    if word.quote_style.is_none() {
                        let upper = word.value.to_uppercase();
                        if BLOCKED_KEYWORDS.contains(&upper.as_str()) && !found.contains(&upper) {
                            found.push(upper);
                        }
                    }
                }
            }
        }
        Err(_) => {
            let mut word = String::new();
            for ch in sql.chars().chain(std::iter::once(' ')) {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    word.push(ch);
                } else if !word.is_empty() {
                    let upper = word.to_uppercase();
                    if BLOCKED_KEYWORDS.contains(&upper.as_str()) && !found.contains(&upper) {
                        found.push(upper);
                    }
                    word.clear();
                }
            }
        }
    }

    found
}

/// Count JOIN clauses and nested SELECT subqueries across the query tree.
fn count_structures(query: &Query) -> (usize, usize) {
    let mut joins = 0;
    let mut subqueries = 0;
    walk_query(query, &mut joins, &mut subqueries);
    (joins, subqueries)
}

fn walk_query(query: &Query, joins: &mut usize, subqueries: &mut usize) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            *subqueries += 1;
            walk_query(&cte.query, joins, subqueries);
        }
    }
    walk_set_expr(&query.body, joins, subqueries);
}

fn walk_set_expr(body: &SetExpr, joins: &mut usize, subqueries: &mut usize) {
    match body {
        SetExpr::Select(select) => walk_select(select, joins, subqueries),
        SetExpr::Query(query) => {
            *subqueries += 1;
            walk_query(query, joins, subqueries);
        }
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, joins, subqueries);
            walk_set_expr(right, joins, subqueries);
        }
        _ => {}
    }
}

fn walk_select(select: &Select, joins: &mut usize, subqueries: &mut usize) {
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                walk_expr(expr, joins, subqueries);
            }
            _ => {}
        }
    }
    for table in &select.from {
        walk_table_with_joins(table, joins, subqueries);
    }
    if let Some(selection) = &select.selection {
        walk_expr(selection, joins, subqueries);
    }
    if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
        for expr in exprs {
            walk_expr(expr, joins, subqueries);
        }
    }
    if let Some(having) = &select.having {
        walk_expr(having, joins, subqueries);
    }
}

fn walk_table_with_joins(table: &TableWithJoins, joins: &mut usize, subqueries: &mut usize) {
    walk_table_factor(&table.relation, joins, subqueries);
    for join in &table.joins {
        *joins += 1;
        walk_table_factor(&join.relation, joins, subqueries);
        if let Some(JoinConstraint::On(expr)) = join_constraint(&join.join_operator) {
            walk_expr(expr, joins, subqueries);
        }
    }
}

fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c)
        | JoinOperator::LeftSemi(c)
        | JoinOperator::RightSemi(c)
        | JoinOperator::LeftAnti(c)
        | JoinOperator::RightAnti(c) => Some(c),
        _ => None,
    }
}

fn walk_table_factor(factor: &TableFactor, joins: &mut usize, subqueries: &mut usize) {
    match factor {
        TableFactor::Derived { subquery, .. } => {
            *subqueries += 1;
            walk_query(subquery, joins, subqueries);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => walk_table_with_joins(table_with_joins, joins, subqueries),
        _ => {}
    }
}

fn walk_expr(expr: &Expr, joins: &mut usize, subqueries: &mut usize) {
    match expr {
        Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
            *subqueries += 1;
            walk_query(query, joins, subqueries);
        }
        Expr::InSubquery { expr, subquery, .. } => {
            walk_expr(expr, joins, subqueries);
            *subqueries += 1;
            walk_query(subquery, joins, subqueries);
        }
        Expr::BinaryOp { left, right, .. }
        | Expr::AnyOp { left, right, .. }
        | Expr::AllOp { left, right, .. } => {
            walk_expr(left, joins, subqueries);
            walk_expr(right, joins, subqueries);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            walk_expr(expr, joins, subqueries);
        }
        Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr) => walk_expr(expr, joins, subqueries),
        Expr::InList { expr, list, .. } => {
            walk_expr(expr, joins, subqueries);
            for item in list {
                walk_expr(item, joins, subqueries);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr(expr, joins, subqueries);
            walk_expr(low, joins, subqueries);
            walk_expr(high, joins, subqueries);
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => {
            walk_expr(expr, joins, subqueries);
            walk_expr(pattern, joins, subqueries);
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                walk_expr(operand, joins, subqueries);
            }
            for condition in conditions {
                walk_expr(condition, joins, subqueries);
            }
            for result in results {
                walk_expr(result, joins, subqueries);
            }
            if let Some(else_result) = else_result {
                walk_expr(else_result, joins, subqueries);
            }
        }
        Expr::Tuple(exprs) => {
            for item in exprs {
                walk_expr(item, joins, subqueries);
            }
        }
        Expr::Function(function) => match &function.args {
            FunctionArguments::Subquery(query) => {
                *subqueries += 1;
                walk_query(query, joins, subqueries);
            }
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    match arg {
                        FunctionArg::Named {
                            arg: FunctionArgExpr::Expr(expr),
                            ..
                        }
                        | FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => {
                            walk_expr(expr, joins, subqueries);
                        }
                        _ => {}
                    }
                }
            }
            FunctionArguments::None => {}
        },
        _ => {}
    }
}
