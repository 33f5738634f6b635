//! Officer assignment.
//!
//! Resolution order, first match wins:
//!
//! 1. officers whose jurisdiction is the project's city;
//! 2. officers whose jurisdiction is the project's state / region;
//! 3. any officer.
//!
//! Within tiers 1 and 2 an officer specialised in the project's category is
//! preferred; ties go to registration order. With no officers at all the
//! project simply stays unassigned.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::auth::{self, Caller};
use crate::db;
use crate::errors::{ConflictKind, RegistryError, Result, StateViolation};
use crate::models::{Location, Project, ProjectId, Role, User, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Officer(UserId),
    NoneAvailable,
}

fn same_region(jurisdiction: Option<&str>, region: &str) -> bool {
    let region = region.trim();
    match jurisdiction {
        Some(j) if !region.is_empty() => j.trim().eq_ignore_ascii_case(region),
        _ => false,
    }
}

fn specialised_in(officer: &User, category: &str) -> bool {
    let category = category.trim();
    officer
        .specializations
        .iter()
        .any(|s| s.trim().eq_ignore_ascii_case(category))
}

fn pick_in_region(officers: &[&User], region: &str, category: &str) -> Option<UserId> {
    let mut local = officers
        .iter()
        .filter(|o| same_region(o.jurisdiction.as_deref(), region))
        .peekable();
    let first = local.peek().map(|o| o.id)?;
    Some(
        local
            .find(|o| specialised_in(o, category))
            .map_or(first, |o| o.id),
    )
}

/// Choose an officer for a project. `officers` must be in registration order.
pub fn resolve(location: &Location, category: &str, officers: &[User]) -> Resolution {
    let officers: Vec<&User> = officers.iter().filter(|u| u.role == Role::Officer).collect();

    pick_in_region(&officers, &location.city, category)
        .or_else(|| pick_in_region(&officers, &location.state, category))
        .or_else(|| officers.first().map(|o| o.id))
        .map_or(Resolution::NoneAvailable, Resolution::Officer)
}

/// Run the resolver for a freshly created project and record the result on
/// the caller's connection, usually inside the creating transaction.
/// `NoneAvailable` is not an error; the project waits for manual assignment.
pub async fn auto_assign(conn: &mut SqliteConnection, project: &Project) -> Result<Resolution> {
    let officers = db::users::list_officers(&mut *conn).await?;
    let resolution = resolve(&project.location, &project.category, &officers);

    match resolution {
        Resolution::Officer(officer_id) => {
            let now = Utc::now().timestamp();
            if !db::projects::set_officer(&mut *conn, project.id, officer_id, now).await? {
                return Err(RegistryError::Conflict(ConflictKind::AlreadyAssigned));
            }
            info!("Assigned officer {officer_id} to project {}", project.id);
        }
        Resolution::NoneAvailable => {
            warn!(
                "No officer available for project {}; left unassigned",
                project.id
            );
        }
    }
    Ok(resolution)
}

/// An officer claims an unassigned project.
pub async fn self_assign(pool: &SqlitePool, caller: &Caller, project_id: ProjectId) -> Result<Project> {
    auth::require(caller, &[Role::Officer])?;

    let now = Utc::now().timestamp();
    if !db::projects::set_officer(pool, project_id, caller.user_id, now).await? {
        // Either the project does not exist or another officer holds it.
        db::projects::get(pool, project_id).await?;
        warn!(
            "Officer {} lost assignment of project {project_id}",
            caller.user_id
        );
        return Err(RegistryError::Conflict(ConflictKind::AlreadyAssigned));
    }

    info!("Officer {} claimed project {project_id}", caller.user_id);
    db::projects::get(pool, project_id).await
}

/// Admin removes the assigned officer so the project can be reassigned.
pub async fn clear_assignment(
    pool: &SqlitePool,
    caller: &Caller,
    project_id: ProjectId,
) -> Result<Project> {
    auth::require(caller, &[Role::Admin])?;

    let now = Utc::now().timestamp();
    if !db::projects::clear_officer(pool, project_id, now).await? {
        db::projects::get(pool, project_id).await?;
        return Err(RegistryError::InvalidState(StateViolation::AssignmentLocked));
    }

    info!("Admin {} cleared assignment of project {project_id}", caller.user_id);
    db::projects::get(pool, project_id).await
}
