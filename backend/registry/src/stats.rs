//! Role-scoped counts over projects and users.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::auth::{self, Caller, Scope};
use crate::db;
use crate::errors::Result;
use crate::models::Role;

/// Verification counts. Every key is always present.
///
/// `in_progress` is derived: pending projects that already have an officer.
/// Projects whose verification has actually started are counted in
/// `under_verification`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStats {
    pub pending: i64,
    pub in_progress: i64,
    pub under_verification: i64,
    pub verified: i64,
    pub rejected: i64,
    pub total: i64,
}

impl VerificationStats {
    /// Fold `(verification_status, count)` groups plus the derived count.
    pub fn from_groups(groups: &[(String, i64)], assigned_pending: i64) -> Self {
        let mut stats = VerificationStats {
            in_progress: assigned_pending,
            ..Default::default()
        };
        for (status, n) in groups {
            match status.as_str() {
                "pending" => stats.pending += n,
                "in_progress" => stats.under_verification += n,
                "verified" => stats.verified += n,
                "rejected" => stats.rejected += n,
                _ => continue,
            }
            stats.total += n;
        }
        stats
    }
}

/// `GET /verifications/stats`. Officers see their own and unassigned projects.
pub async fn verification_stats(pool: &SqlitePool, caller: &Caller) -> Result<VerificationStats> {
    auth::require(caller, &[Role::Officer, Role::Admin])?;
    let scope = Scope::for_caller(caller);
    let groups = db::projects::count_by_verification_status(pool, scope).await?;
    let assigned_pending = db::projects::count_assigned_pending(pool, scope).await?;
    Ok(VerificationStats::from_groups(&groups, assigned_pending))
}

/// User counts keyed by role name, zero-filled for roles with no users.
pub fn role_counts(groups: &[(String, i64)]) -> BTreeMap<&'static str, i64> {
    let mut counts: BTreeMap<&'static str, i64> =
        Role::ALL.iter().map(|r| (r.as_str(), 0)).collect();
    for (role, n) in groups {
        if let Ok(role) = Role::parse(role) {
            *counts.entry(role.as_str()).or_default() += n;
        }
    }
    counts
}

/// `GET /users/stats` (admin).
pub async fn user_stats(pool: &SqlitePool, caller: &Caller) -> Result<BTreeMap<&'static str, i64>> {
    auth::require(caller, &[Role::Admin])?;
    let groups = db::users::count_by_role(pool).await?;
    Ok(role_counts(&groups))
}
