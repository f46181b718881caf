//! `sqlsentry validate` — one-shot SQL validation.

use sqlsentry_config::Settings;
use sqlsentry_guard::{SqlLimits, validate};

pub fn run(query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let limits = SqlLimits {
        max_joins: settings.sql.max_joins,
        max_subqueries: settings.sql.max_subqueries,
    };

    let verdict = validate(query, &limits);

    if verdict.accepted {
        println!("SQL query is valid.");
        println!();
        if let Some(canonical) = &verdict.canonical {
            println!("Formatted query:");
            println!("  {canonical}");
            println!();
        }
        println!("Analysis:");
        println!("  - Statement:  {}", verdict.statement_kind);
        println!("  - JOINs:      {}/{}", verdict.join_count, limits.max_joins);
        println!(
            "  - Subqueries: {}/{}",
            verdict.subquery_count, limits.max_subqueries
        );
    } else {
        println!("SQL query validation failed.");
        println!();
        println!("Errors:");
        for reason in &verdict.reasons {
            println!("  - {reason}");
        }
        std::process::exit(1);
    }

    Ok(())
}
