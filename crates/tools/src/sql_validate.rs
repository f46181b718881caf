//! SQL validator tool — validates SELECT queries without executing them.
//!
//! Wraps the guard's validator so the model and the guard apply the exact
//! same policy. A policy rejection is a successful tool execution whose
//! output describes the rejection; only malformed arguments are an error.

use async_trait::async_trait;
use sqlsentry_core::error::ToolError;
use sqlsentry_core::tool::{Tool, ToolResult};
use sqlsentry_guard::{SqlLimits, validate};
use tracing::debug;

pub struct SqlValidateTool {
    limits: SqlLimits,
}

impl SqlValidateTool {
    pub fn new(limits: SqlLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Tool for SqlValidateTool {
    fn name(&self) -> &str {
        "sql_validator"
    }

    fn description(&self) -> &str {
        "Validate and analyze a SQL SELECT query without executing it. \
         Only SELECT statements are allowed; destructive operations \
         (INSERT, UPDATE, DELETE, DROP, ...) and overly complex queries \
         are rejected. Always use this tool before presenting any SQL."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL query to validate, e.g. 'SELECT * FROM users WHERE age > 18'"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let verdict = validate(query, &self.limits);
        debug!(accepted = verdict.accepted, "sql_validator ran");

        let output = if verdict.accepted {
            format!(
                "SQL query is valid.\n\n\
                 Formatted query:\n{}\n\n\
                 Analysis:\n\
                 - JOINs: {}/{}\n\
                 - Subqueries: {}/{}\n\n\
                 This query is safe and ready for execution (dry-run mode).",
                verdict.canonical.as_deref().unwrap_or(query),
                verdict.join_count,
                self.limits.max_joins,
                verdict.subquery_count,
                self.limits.max_subqueries,
            )
        } else {
            let reasons = verdict
                .reasons
                .iter()
                .map(|r| format!("  - {r}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "SQL query validation failed.\n\nErrors:\n{reasons}\n\n\
                 Please fix these issues before proceeding."
            )
        };

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> SqlValidateTool {
        SqlValidateTool::new(SqlLimits::default())
    }

    #[tokio::test]
    async fn valid_query_produces_report() {
        let result = tool()
            .execute(serde_json::json!({"query": "SELECT * FROM users WHERE age > 18"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("SQL query is valid"));
        assert!(result.output.contains("JOINs: 0/3"));
        assert!(result.output.contains("Subqueries: 0/5"));
    }

    #[tokio::test]
    async fn rejected_query_is_normal_output_not_error() {
        let result = tool()
            .execute(serde_json::json!({"query": "DROP TABLE users"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("validation failed"));
        assert!(result.output.contains("DROP"));
    }

    #[tokio::test]
    async fn missing_query_argument_is_an_error() {
        let err = tool().execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn report_reflects_configured_limits() {
        let tight = SqlValidateTool::new(SqlLimits {
            max_joins: 1,
            max_subqueries: 2,
        });
        let result = tight
            .execute(serde_json::json!({"query": "SELECT id FROM t"}))
            .await
            .unwrap();
        assert!(result.output.contains("JOINs: 0/1"));
        assert!(result.output.contains("Subqueries: 0/2"));
    }

    #[test]
    fn definition_exposes_schema() {
        let def = tool().to_definition();
        assert_eq!(def.name, "sql_validator");
        assert!(def.parameters["required"][0] == "query");
    }
}
