//! Application-wide error types.
//!
//! The first five variants are the client-visible taxonomy; the remaining
//! ones wrap collaborator failures and are reported as generic server errors.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid state: {0}")]
    InvalidState(StateViolation),

    #[error("Incomplete data: {field} {reason}")]
    IncompleteData { field: &'static str, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(String),
}

/// Why an operation is not legal in the project's current lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    NotAssigned,
    AlreadyStarted,
    NotInProgress,
    AlreadyDecided,
    AlreadyVerified,
    AssignmentLocked,
    NotVerified,
}

impl fmt::Display for StateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotAssigned => "caller is not the assigned officer",
            Self::AlreadyStarted => "verification has already started",
            Self::NotInProgress => "verification is not in progress",
            Self::AlreadyDecided => "a verification decision has already been recorded",
            Self::AlreadyVerified => "project is already verified",
            Self::AssignmentLocked => "assignment can only change while verification is pending",
            Self::NotVerified => "project is not verified",
        };
        f.write_str(msg)
    }
}

/// Lost races and uniqueness collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    AlreadyAssigned,
    DuplicateReport,
    DistributionExists,
    StateChanged,
    EmailTaken,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::AlreadyAssigned => "project already has an assigned officer",
            Self::DuplicateReport => "a decision-bearing report already exists for this project",
            Self::DistributionExists => "a distribution already exists for this project",
            Self::StateChanged => "project changed concurrently, re-fetch and retry",
            Self::EmailTaken => "email is already registered",
        };
        f.write_str(msg)
    }
}

impl RegistryError {
    pub fn incomplete(field: &'static str, reason: impl Into<String>) -> Self {
        Self::IncompleteData {
            field,
            reason: reason.into(),
        }
    }

    /// A stored value that does not decode. Reported as a store fault, never
    /// as bad request input.
    pub fn corrupt_column(column: &'static str, reason: impl Into<String>) -> Self {
        Self::Database(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: reason.into().into(),
        })
    }

    /// Collaborator failures: safe for the caller to retry, never partially applied.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Migrate(_)
                | Self::Http(_)
                | Self::Json(_)
                | Self::Config(_)
                | Self::Ledger(_)
        )
    }

    /// Short machine-readable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidState(_) => "invalid_state",
            Self::IncompleteData { .. } => "incomplete_data",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            _ => "dependency_failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
