//! Project lifecycle state machine.
//!
//! ```text
//! Pending ──► InVerification ──► Approved { by, at }
//!                    └─────────► Rejected { by, at }
//! ```
//!
//! The stored `verification_status` / `lifecycle_status` columns are both
//! derived from a single [`ProjectState`], so a verified project is always
//! approved and a rejected verification always rejects the project. No
//! transition leaves `Approved` or `Rejected`.
//!
//! Every write of the status columns goes through [`db::projects::transition`]
//! with the expected current state as the guard, so concurrent callers cannot
//! both move the same project.

use chrono::Utc;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::auth::{self, Caller};
use crate::db;
use crate::errors::{ConflictKind, RegistryError, Result, StateViolation};
use crate::models::{Decision, Project, ProjectId, Role, UserId};

/// Field-verification status as stored and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    Pending,
    InProgress,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

/// Administrative status; always a function of the verification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Pending,
    Approved,
    Rejected,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectState {
    Pending,
    InVerification,
    Approved { by: UserId, at: i64 },
    Rejected { by: UserId, at: i64 },
}

impl ProjectState {
    pub fn verification_status(&self) -> VerificationStatus {
        match self {
            Self::Pending => VerificationStatus::Pending,
            Self::InVerification => VerificationStatus::InProgress,
            Self::Approved { .. } => VerificationStatus::Verified,
            Self::Rejected { .. } => VerificationStatus::Rejected,
        }
    }

    pub fn lifecycle_status(&self) -> LifecycleStatus {
        match self {
            Self::Pending | Self::InVerification => LifecycleStatus::Pending,
            Self::Approved { .. } => LifecycleStatus::Approved,
            Self::Rejected { .. } => LifecycleStatus::Rejected,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved { .. } | Self::Rejected { .. })
    }

    /// Who recorded the decision and when, for terminal states.
    pub fn decided(&self) -> Option<(UserId, i64)> {
        match *self {
            Self::Approved { by, at } | Self::Rejected { by, at } => Some((by, at)),
            _ => None,
        }
    }

    /// `pending → in_progress`.
    pub fn start(&self) -> Result<ProjectState> {
        match self {
            Self::Pending => Ok(Self::InVerification),
            _ => Err(RegistryError::InvalidState(StateViolation::AlreadyStarted)),
        }
    }

    /// `in_progress → verified | rejected`.
    pub fn decide(&self, decision: Decision, by: UserId, at: i64) -> Result<ProjectState> {
        match self {
            Self::InVerification => Ok(match decision {
                Decision::Approve => Self::Approved { by, at },
                Decision::Reject => Self::Rejected { by, at },
            }),
            _ => Err(RegistryError::InvalidState(StateViolation::NotInProgress)),
        }
    }

    /// Rebuild the state from its stored columns.
    pub fn from_columns(
        verification_status: &str,
        decided_by: Option<UserId>,
        decided_at: Option<i64>,
    ) -> Result<Self> {
        let decided = decided_by.zip(decided_at);
        match (verification_status, decided) {
            ("pending", None) => Ok(Self::Pending),
            ("in_progress", None) => Ok(Self::InVerification),
            ("verified", Some((by, at))) => Ok(Self::Approved { by, at }),
            ("rejected", Some((by, at))) => Ok(Self::Rejected { by, at }),
            (other, _) => Err(RegistryError::corrupt_column(
                "verification_status",
                format!("inconsistent stored state {other:?}"),
            )),
        }
    }
}

impl Serialize for ProjectState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let decided = self.decided();
        let mut s = serializer.serialize_struct("ProjectState", 4)?;
        s.serialize_field("verification_status", self.verification_status().as_str())?;
        s.serialize_field("lifecycle_status", self.lifecycle_status().as_str())?;
        s.serialize_field("decided_by", &decided.map(|(by, _)| by))?;
        s.serialize_field("decided_at", &decided.map(|(_, at)| at))?;
        s.end()
    }
}

/// Guard for "start verification": only the assigned officer, only from pending.
pub fn check_start(project: &Project, caller_id: UserId) -> Result<ProjectState> {
    if project.assigned_officer != Some(caller_id) {
        return Err(RegistryError::InvalidState(StateViolation::NotAssigned));
    }
    project.state.start()
}

/// Guard for the decision transition driven by an accepted report.
pub fn check_decision(
    project: &Project,
    report_exists: bool,
    decision: Decision,
    by: UserId,
    at: i64,
) -> Result<ProjectState> {
    let next = project.state.decide(decision, by, at)?;
    if report_exists {
        return Err(RegistryError::Conflict(ConflictKind::DuplicateReport));
    }
    Ok(next)
}

/// The assigned officer moves a project from `pending` to `in_progress`.
pub async fn start_verification(
    pool: &SqlitePool,
    caller: &Caller,
    project_id: ProjectId,
) -> Result<Project> {
    auth::require(caller, &[Role::Officer])?;

    let project = db::projects::get(pool, project_id).await?;
    let next = check_start(&project, caller.user_id)?;

    let now = Utc::now().timestamp();
    let won =
        db::projects::transition(pool, project_id, caller.user_id, &project.state, &next, now)
            .await?;
    if !won {
        // Someone moved the project between our read and write; report
        // whatever the fresh state says is wrong.
        let fresh = db::projects::get(pool, project_id).await?;
        warn!("Lost start-verification race on project {project_id}");
        check_start(&fresh, caller.user_id)?;
        return Err(RegistryError::Conflict(ConflictKind::StateChanged));
    }

    info!(
        "Officer {} started verification of project {project_id}",
        caller.user_id
    );
    db::projects::get(pool, project_id).await
}
