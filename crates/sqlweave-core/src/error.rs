//! Error types for command construction and execution.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::token::RowCountCheck;

/// Boxed error raised by a database driver.
pub type DriverError = Box<dyn StdError + Send + Sync>;

/// The kind of database object a lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A table or a view.
    TableOrView,
    /// A base table.
    Table,
    /// A view.
    View,
    /// A stored procedure.
    StoredProcedure,
    /// A table-valued function.
    TableFunction,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TableOrView => "table or view",
            Self::Table => "table",
            Self::View => "view",
            Self::StoredProcedure => "stored procedure",
            Self::TableFunction => "table function",
        })
    }
}

/// Errors raised while resolving metadata, preparing commands or
/// executing token chains.
#[derive(Debug, Error)]
pub enum WeaveError {
    /// A named database object does not exist.
    #[error("{kind} '{name}' was not found")]
    MissingObject {
        /// What was being looked up.
        kind: ObjectKind,
        /// The name as requested by the caller.
        name: String,
    },

    /// An object name could not be parsed.
    #[error("invalid object name '{0}'")]
    InvalidName(String),

    /// An argument value, filter value or desired-column list could not be
    /// reconciled with the table metadata.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// The dialect does not support the requested feature.
    #[error("{feature} is not supported by {dialect}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// The offending option or capability.
        feature: String,
    },

    /// The request is internally inconsistent.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A generated statement would bind the same parameter name twice.
    #[error("the same parameter name '{name}' appears in both the {first} and the {second}")]
    DuplicateParameter {
        /// Parameter name, including its prefix.
        name: String,
        /// Where the first occurrence came from.
        first: String,
        /// Where the second occurrence came from.
        second: String,
    },

    /// The statement ran but affected an unexpected number of rows.
    #[error("data integrity violation: {operation} expected {expected} but {actual} rows were affected")]
    RowCountMismatch {
        /// Operation name of the failing link.
        operation: String,
        /// The expectation attached to the link.
        expected: RowCountCheck,
        /// Rows actually affected.
        actual: u64,
    },

    /// A scalar-and-forward link had nothing to forward to.
    #[error("execution link {index} ({operation}) forwards a scalar but has no forwarder")]
    MissingForwarder {
        /// Position of the link in its chain.
        index: usize,
        /// Operation name of the link.
        operation: String,
    },

    /// Settings could not be read.
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    /// The database driver reported an error.
    #[error("database error: {0}")]
    Driver(#[source] DriverError),

    /// Execution was cancelled or timed out.
    #[error("the command was cancelled")]
    Cancelled,
}

impl WeaveError {
    /// Wraps a driver error.
    pub fn driver(error: impl Into<DriverError>) -> Self {
        Self::Driver(error.into())
    }

    /// Builds an [`WeaveError::Unsupported`] error.
    pub fn unsupported(dialect: &'static str, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect,
            feature: feature.into(),
        }
    }

    /// Builds a [`WeaveError::MissingObject`] error.
    pub fn missing(kind: ObjectKind, name: impl fmt::Display) -> Self {
        Self::MissingObject {
            kind,
            name: name.to_string(),
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WeaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_message() {
        let err = WeaveError::missing(ObjectKind::TableOrView, "dbo.Customer");
        assert_eq!(err.to_string(), "table or view 'dbo.Customer' was not found");
    }

    #[test]
    fn test_duplicate_parameter_message() {
        let err = WeaveError::DuplicateParameter {
            name: "@Name".into(),
            first: "argument value".into(),
            second: "filter value".into(),
        };
        assert_eq!(
            err.to_string(),
            "the same parameter name '@Name' appears in both the argument value and the filter value"
        );
    }

    #[test]
    fn test_row_count_mismatch_message() {
        let err = WeaveError::RowCountMismatch {
            operation: "UpdateObject".into(),
            expected: RowCountCheck::ExactlyOne,
            actual: 0,
        };
        assert_eq!(
            err.to_string(),
            "data integrity violation: UpdateObject expected exactly one row but 0 rows were affected"
        );
    }
}
