use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt catalog: {0}")]
    CorruptCatalog(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation '{operation}' failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Write-write conflict: {0}")]
    WriteConflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl DbError {
    /// Wraps a store failure as the failure of one named operation.
    ///
    /// Connection errors pass through untouched: they describe the store,
    /// not the operation.
    pub fn into_operation_failure(self, operation: impl Into<String>) -> Self {
        match self {
            err @ (Self::ConnectionError(_) | Self::OperationFailed { .. }) => err,
            other => Self::OperationFailed {
                operation: operation.into(),
                reason: other.to_string(),
            },
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<sqlparser::parser::ParserError> for DbError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::ParseError(err.to_string())
    }
}
