//! Migration error types.
//!
//! Plugin and hook errors live next to the code that raises them
//! (`plugin::error`, `plugin::hooks`).

use thiserror::Error;

/// Errors raised while applying schema migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migration has no SQL attached.
    #[error("migration '{id}' has no SQL")]
    MissingSql { id: String },

    /// A statement failed with an error that is not tolerated.
    #[error("migration '{id}' failed on statement {statement}: {details}")]
    StatementFailed {
        id: String,
        statement: usize,
        details: String,
    },

    /// The migration id is not part of the migration list.
    #[error("unknown migration '{id}'")]
    Unknown { id: String },
}

impl MigrationError {
    /// Create a statement failure error.
    pub fn statement_failed(id: impl Into<String>, statement: usize, details: impl Into<String>) -> Self {
        Self::StatementFailed {
            id: id.into(),
            statement,
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_failure_names_migration_and_statement() {
        let err = MigrationError::statement_failed("003", 2, "no such table: logs");
        let msg = err.to_string();
        assert!(msg.contains("'003'"));
        assert!(msg.contains("statement 2"));
        assert!(msg.contains("no such table"));
    }
}
