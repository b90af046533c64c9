//! Repository error type shared by persistence and lifecycle processing.

use crate::db::DbError;
use crate::rules::RuleViolation;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Every failure surfaced by the batch repository and its lifecycle hooks.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Caller supplied nothing to work on.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Statement rendering failed for one object.
    #[error("cannot build statement for {object}: {message}")]
    Parsing { object: String, message: String },
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("database connection is not open")]
    ConnectionClosed,
    #[error("no active transaction")]
    NoActiveTransaction,
    #[error(transparent)]
    RuleViolation(#[from] RuleViolation),
    #[error("approval authorization failed: {0}")]
    ApprovalAuthorization(String),
    #[error("approval process failed: {0}")]
    ApprovalProcess(String),
    /// Referenced objects may only be soft-deleted.
    #[error("referenced object {0} cannot be deleted")]
    NotAllowedDelete(String),
    #[error(transparent)]
    LogicExecution(#[from] crate::logic::LogicError),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    /// Stable machine-readable code for logs and result envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Parsing { .. } => "parsing_error",
            Self::Db(_) => "db_error",
            Self::ConnectionClosed => "connection_closed",
            Self::NoActiveTransaction => "no_active_transaction",
            Self::RuleViolation(_) => "rule_violation",
            Self::ApprovalAuthorization(_) => "approval_authorization",
            Self::ApprovalProcess(_) => "approval_process",
            Self::NotAllowedDelete(_) => "not_allowed_delete",
            Self::LogicExecution(_) => "logic_execution",
        }
    }

    pub(crate) fn parsing(object: &impl ToString, message: impl Into<String>) -> Self {
        Self::Parsing {
            object: object.to_string(),
            message: message.into(),
        }
    }
}
