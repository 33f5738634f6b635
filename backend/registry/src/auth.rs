//! Role authorization gate, ownership checks and the role scope predicate.
//!
//! Authentication (turning a bearer credential into a [`Caller`]) happens
//! before any of this runs; a denial here is always "authenticated but not
//! allowed", never "unknown caller".

use sha2::{Digest, Sha256};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db;
use crate::errors::{RegistryError, Result};
use crate::models::{CreditDistribution, Project, Role, UserId};

/// An authenticated request principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Pure role check.
pub fn authorize(caller_role: Role, required_roles: &[Role]) -> Access {
    if required_roles.contains(&caller_role) {
        Access::Allow
    } else {
        Access::Deny
    }
}

/// [`authorize`], turned into an error on denial.
pub fn require(caller: &Caller, required_roles: &[Role]) -> Result<()> {
    match authorize(caller.role, required_roles) {
        Access::Allow => Ok(()),
        Access::Deny => Err(RegistryError::Unauthorized(format!(
            "role {} may not perform this action",
            caller.role.as_str()
        ))),
    }
}

/// Second-layer check: admins pass, authorities only for projects they own.
pub fn require_owner_or_admin(caller: &Caller, project: &Project) -> Result<()> {
    require(caller, &[Role::Admin, Role::ProjectAuthority])?;
    if caller.role == Role::ProjectAuthority && project.owner_id != caller.user_id {
        return Err(RegistryError::Unauthorized(format!(
            "user {} does not own project {}",
            caller.user_id, project.id
        )));
    }
    Ok(())
}

/// Which records a caller may see. Every list, single read and aggregate
/// applies the same predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Project authority: projects it owns, distributions naming it.
    Authority(UserId),
    /// Officer: projects assigned to it or still unassigned, distributions naming it.
    Officer(UserId),
}

impl Scope {
    pub fn for_caller(caller: &Caller) -> Self {
        match caller.role {
            Role::Admin => Self::All,
            Role::Officer => Self::Officer(caller.user_id),
            Role::ProjectAuthority => Self::Authority(caller.user_id),
        }
    }

    pub fn admits_project(&self, project: &Project) -> bool {
        match *self {
            Self::All => true,
            Self::Authority(id) => project.owner_id == id,
            Self::Officer(id) => project.assigned_officer.map_or(true, |o| o == id),
        }
    }

    pub fn admits_distribution(&self, distribution: &CreditDistribution) -> bool {
        match *self {
            Self::All => true,
            Self::Authority(id) => distribution.authority_id == id,
            Self::Officer(id) => distribution.officer_id == id,
        }
    }

    /// Append the project predicate as an `AND (...)` clause.
    pub fn push_project_filter(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match *self {
            Self::All => {}
            Self::Authority(id) => {
                qb.push(" AND owner_id = ").push_bind(id);
            }
            Self::Officer(id) => {
                qb.push(" AND (assigned_officer = ")
                    .push_bind(id)
                    .push(" OR assigned_officer IS NULL)");
            }
        }
    }

    /// Append the distribution predicate as an `AND (...)` clause.
    pub fn push_distribution_filter(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match *self {
            Self::All => {}
            Self::Authority(id) => {
                qb.push(" AND authority_id = ").push_bind(id);
            }
            Self::Officer(id) => {
                qb.push(" AND officer_id = ").push_bind(id);
            }
        }
    }
}

/// Stored form of a bearer credential.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Resolve a bearer credential. `None` means "not authenticated".
pub async fn resolve_bearer(pool: &SqlitePool, token: &str) -> Result<Option<Caller>> {
    if token.is_empty() {
        return Ok(None);
    }
    let found = db::users::find_by_token_hash(pool, &hash_token(token)).await?;
    Ok(found.map(|user| Caller {
        user_id: user.id,
        role: user.role,
    }))
}
