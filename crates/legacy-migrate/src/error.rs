//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A run precondition was violated before touching the destination.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A schema bootstrap script failed for a reason other than
    /// "object already exists".
    #[error("Schema script {script} failed: {message}")]
    Schema { script: String, message: String },

    /// A table mapping violates its invariants.
    #[error("Invalid mapping for table {table}: {message}")]
    Mapping { table: String, message: String },

    /// Legacy (SQLite) store error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Networked destination error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A batch write failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Mapping error
    pub fn mapping(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Mapping {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Schema error
    pub fn schema(script: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Schema {
            script: script.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::Precondition(_)
            | MigrateError::Yaml(_) => 1,
            MigrateError::Mapping { .. } => 3,
            MigrateError::Source(_) => 4,
            MigrateError::Target(_) | MigrateError::Pool { .. } => 5,
            MigrateError::Schema { .. } => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Transfer { .. } | MigrateError::Json(_) => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(MigrateError::Precondition("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::mapping("users", "x").exit_code(), 3);
        assert_eq!(MigrateError::schema("a.sql", "boom").exit_code(), 6);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(MigrateError::from(io).exit_code(), 7);
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::transfer("users", "batch 2 rejected");
        let text = err.format_detailed();
        assert!(text.starts_with("Error: Transfer failed for table users"));
        assert!(text.contains("batch 2 rejected"));
    }
}
