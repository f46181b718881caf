//! Built-in tool implementations for sqlsentry.
//!
//! The one tool that matters here is the SQL validator: it lets the model
//! route any SQL through the same policy the guard enforces, so a
//! well-behaved model never has to emit raw SQL at all.

pub mod sql_validate;

use sqlsentry_core::tool::ToolRegistry;
use sqlsentry_guard::SqlLimits;

pub use sql_validate::SqlValidateTool;

/// Create the default tool registry.
///
/// Registration happens here, at composition time — tools carry no global
/// state and nothing registers itself as an import side effect.
pub fn default_registry(limits: SqlLimits) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SqlValidateTool::new(limits)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_sql_validator() {
        let registry = default_registry(SqlLimits::default());
        assert!(registry.get("sql_validator").is_some());
        assert_eq!(registry.definitions().len(), 1);
    }
}
