//! Error types for the ETL library.

use thiserror::Error;

use crate::load::LoadStage;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for warehouse connection errors.
pub const EXIT_WAREHOUSE_ERROR: u8 = 2;
/// Exit code for failed load or DDL statements.
pub const EXIT_LOAD_ERROR: u8 = 3;
/// Exit code for failed data-quality reconciliation.
pub const EXIT_RECONCILE_ERROR: u8 = 4;
/// Exit code for object-storage errors.
pub const EXIT_STORAGE_ERROR: u8 = 5;
/// Exit code for extract cleaning errors.
pub const EXIT_CLEAN_ERROR: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Warehouse driver error
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] tokio_postgres::Error),

    /// Statement failed for a reason the driver did not classify
    #[error("Query failed: {0}")]
    Query(String),

    /// A load or DDL statement failed for a specific table
    #[error("Failed to {stage} table {table}")]
    Load {
        stage: LoadStage,
        table: String,
        #[source]
        source: Box<EtlError>,
    },

    /// A quality check query could not be executed
    #[error("Failed to retrieve quality check {check}")]
    Check {
        check: String,
        #[source]
        source: Box<EtlError>,
    },

    /// A quality check returned no row or a NULL value
    #[error("No results returned for quality check {check}")]
    MissingResult { check: String },

    /// A quality check returned something that is not an integer
    #[error("Quality check {check} returned non-integer value '{value}'")]
    InvalidResult { check: String, value: String },

    /// Two adjacent quality checks disagree
    #[error(
        "Data quality check failed: {previous} ({previous_total}) and {current} ({current_total}) totals are not equal"
    )]
    Mismatch {
        previous: String,
        previous_total: i64,
        current: String,
        current_total: i64,
    },

    /// Extract cleaning failed for a specific file
    #[error("Cleaning failed for {file}: {message}")]
    Clean { file: String, message: String },

    /// Object-storage upload failed for a specific file
    #[error("Upload failed for {file}")]
    Upload {
        file: String,
        #[source]
        source: object_store::Error,
    },

    /// Object-storage client error
    #[error("Storage error: {0}")]
    Storage(#[from] object_store::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    /// Create a Load error wrapping the failure of one statement.
    pub fn load(stage: LoadStage, table: impl Into<String>, source: EtlError) -> Self {
        EtlError::Load {
            stage,
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Create a Check error wrapping a failed quality check query.
    pub fn check(check: impl Into<String>, source: EtlError) -> Self {
        EtlError::Check {
            check: check.into(),
            source: Box::new(source),
        }
    }

    /// Create a Clean error
    pub fn clean(file: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::Clean {
            file: file.into(),
            message: message.into(),
        }
    }

    /// True for the three reconciliation failure kinds.
    pub fn is_reconciliation_failure(&self) -> bool {
        matches!(
            self,
            EtlError::Check { .. }
                | EtlError::MissingResult { .. }
                | EtlError::InvalidResult { .. }
                | EtlError::Mismatch { .. }
        )
    }

    /// Map the error to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::Config(_) | EtlError::Yaml(_) | EtlError::Json(_) => EXIT_CONFIG_ERROR,
            EtlError::Warehouse(_) | EtlError::Query(_) => EXIT_WAREHOUSE_ERROR,
            EtlError::Load { .. } => EXIT_LOAD_ERROR,
            EtlError::Check { .. }
            | EtlError::MissingResult { .. }
            | EtlError::InvalidResult { .. }
            | EtlError::Mismatch { .. } => EXIT_RECONCILE_ERROR,
            EtlError::Upload { .. } | EtlError::Storage(_) => EXIT_STORAGE_ERROR,
            EtlError::Clean { .. } | EtlError::Csv(_) => EXIT_CLEAN_ERROR,
            EtlError::Io(_) => EXIT_IO_ERROR,
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

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_names_table_and_cause() {
        let err = EtlError::load(
            LoadStage::Staging,
            "staging_airport",
            EtlError::Query("relation does not exist".into()),
        );
        let detailed = err.format_detailed();
        assert!(detailed.contains("Failed to load staging table staging_airport"));
        assert!(detailed.contains("Caused by:\n  1: Query failed: relation does not exist"));
        assert_eq!(err.exit_code(), EXIT_LOAD_ERROR);
    }

    #[test]
    fn test_reconciliation_errors_share_exit_code() {
        let missing = EtlError::MissingResult {
            check: "fact_dim_b".into(),
        };
        let mismatch = EtlError::Mismatch {
            previous: "fact_dim_a".into(),
            previous_total: 100,
            current: "fact_dim_b".into(),
            current_total: 95,
        };
        assert!(missing.is_reconciliation_failure());
        assert!(mismatch.is_reconciliation_failure());
        assert_eq!(missing.exit_code(), EXIT_RECONCILE_ERROR);
        assert_eq!(mismatch.exit_code(), EXIT_RECONCILE_ERROR);
        assert!(mismatch.to_string().contains("fact_dim_a (100) and fact_dim_b (95)"));
    }

    #[test]
    fn test_io_error_exit_code() {
        let err = EtlError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert_eq!(err.exit_code(), EXIT_IO_ERROR);
        assert!(!err.is_reconciliation_failure());
    }
}
