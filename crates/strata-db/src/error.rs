//! Error types for strata-db.

use miette::Diagnostic;
use thiserror::Error;

/// Database error type for query building and execution.
#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    #[diagnostic(code(strata_db::sqlite), help("Check the generated SQL and bound parameters"))]
    Sqlite(#[from] rusqlite::Error),

    #[error("Query has no SQL text to execute")]
    #[diagnostic(
        code(strata_db::missing_sql),
        help("Only compiled queries can be executed through a session")
    )]
    MissingSql,

    #[error("Unknown named parameter `{0}`")]
    #[diagnostic(code(strata_db::unknown_parameter))]
    UnknownParameter(String),

    #[error("Column `{column}` not found in row")]
    #[diagnostic(code(strata_db::missing_column))]
    MissingColumn { column: String },

    #[error("Column `{column}` holds {found}, expected {expected}")]
    #[diagnostic(
        code(strata_db::type_mismatch),
        help("Check that the entity's FromRow implementation matches the table schema")
    )]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Database connection lock poisoned")]
    #[diagnostic(code(strata_db::poisoned), help("A previous query panicked while holding the connection"))]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// Result type alias for strata-db operations.
pub type Result<T> = std::result::Result<T, DbError>;
