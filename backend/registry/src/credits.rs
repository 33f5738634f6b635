//! Credit distribution: share arithmetic, distribution records and the
//! role-scoped credit totals.
//!
//! Admins see absolute token-supply figures read from the ledger; officers
//! and authorities see their contractual share of distributed totals. The two
//! are computed differently on purpose.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::auth::{self, Caller, Scope};
use crate::db;
use crate::db::distributions::NewDistribution;
use crate::errors::{RegistryError, Result, StateViolation};
use crate::ledger::{LedgerClient, Supply};
use crate::lifecycle::ProjectState;
use crate::models::{CreditDistribution, DistributionStatus, ProjectId, Role};
use crate::pagination::{Page, PageLimits, PageRequest};

/// Default officer / authority percentages; the remainder stays reserved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SharePolicy {
    pub officer_pct: f64,
    pub authority_pct: f64,
}

impl Default for SharePolicy {
    fn default() -> Self {
        SharePolicy {
            officer_pct: 10.0,
            authority_pct: 80.0,
        }
    }
}

/// `(total * officer_pct / 100, total * authority_pct / 100)`.
///
/// Fails with an `InvalidShares` data error when a percentage is negative or
/// the two add up to more than 100.
pub fn compute_shares(total_credits: f64, officer_pct: f64, authority_pct: f64) -> Result<(f64, f64)> {
    if !total_credits.is_finite() || total_credits < 0.0 {
        return Err(RegistryError::incomplete(
            "total_credits",
            "must be a non-negative number",
        ));
    }
    let valid = officer_pct.is_finite()
        && authority_pct.is_finite()
        && officer_pct >= 0.0
        && authority_pct >= 0.0
        && officer_pct + authority_pct <= 100.0;
    if !valid {
        return Err(RegistryError::incomplete(
            "shares",
            format!("InvalidShares: officer {officer_pct}% + authority {authority_pct}% must be non-negative and at most 100%"),
        ));
    }
    Ok((
        total_credits * officer_pct / 100.0,
        total_credits * authority_pct / 100.0,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CreditTotals {
    pub total_credits: f64,
    pub available_credits: f64,
}

/// Admin view: everything minted, less what has been burned.
pub fn admin_totals(supply: &Supply) -> CreditTotals {
    CreditTotals {
        total_credits: supply.minted,
        available_credits: (supply.minted - supply.burned).max(0.0),
    }
}

/// Officer / authority view: the caller's percentage of every distributed
/// record naming it. Distributed shares count as immediately available.
/// Under [`Scope::All`] this is the plain sum of distributed totals.
pub fn share_totals(scope: Scope, distributions: &[CreditDistribution]) -> CreditTotals {
    let total: f64 = distributions
        .iter()
        .filter(|d| d.status == DistributionStatus::Distributed && scope.admits_distribution(d))
        .map(|d| match scope {
            Scope::Officer(_) => d.total_credits * d.officer_share_pct / 100.0,
            Scope::Authority(_) => d.total_credits * d.authority_share_pct / 100.0,
            Scope::All => d.total_credits,
        })
        .sum();
    CreditTotals {
        total_credits: total,
        available_credits: total,
    }
}

/// `GET /credits/stats` for any role.
pub async fn credit_stats(pool: &SqlitePool, ledger: &LedgerClient, caller: &Caller) -> Result<CreditTotals> {
    match Scope::for_caller(caller) {
        Scope::All => Ok(admin_totals(&ledger.supply(pool).await?)),
        scope => {
            let distributions = db::distributions::list_distributed(pool, scope).await?;
            Ok(share_totals(scope, &distributions))
        }
    }
}

/// Optional per-record overrides; unset fields fall back to the verified
/// report and the configured policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistributionRequest {
    pub total_credits: Option<f64>,
    pub officer_share_pct: Option<f64>,
    pub authority_share_pct: Option<f64>,
}

/// Record a pending distribution for a verified project.
pub async fn create_distribution(
    pool: &SqlitePool,
    caller: &Caller,
    project_id: ProjectId,
    request: DistributionRequest,
    policy: SharePolicy,
) -> Result<CreditDistribution> {
    auth::require(caller, &[Role::Admin, Role::Officer])?;

    let project = db::projects::get(pool, project_id).await?;
    if caller.role == Role::Officer && project.assigned_officer != Some(caller.user_id) {
        return Err(RegistryError::Unauthorized(format!(
            "user {} is not the assigned officer of project {project_id}",
            caller.user_id
        )));
    }
    if !matches!(project.state, ProjectState::Approved { .. }) {
        return Err(RegistryError::InvalidState(StateViolation::NotVerified));
    }
    let officer_id = project
        .assigned_officer
        .ok_or(RegistryError::InvalidState(StateViolation::NotAssigned))?;

    let total_credits = match request.total_credits {
        Some(total) => total,
        None => {
            db::reports::find_for_project(pool, project_id)
                .await?
                .ok_or_else(|| RegistryError::NotFound(format!("report for project {project_id}")))?
                .measurements
                .recommended_credits
        }
    };
    let officer_share_pct = request.officer_share_pct.unwrap_or(policy.officer_pct);
    let authority_share_pct = request.authority_share_pct.unwrap_or(policy.authority_pct);
    let (officer_credits, authority_credits) =
        compute_shares(total_credits, officer_share_pct, authority_share_pct)?;

    let new = NewDistribution {
        project_id,
        officer_id,
        authority_id: project.owner_id,
        total_credits,
        officer_share_pct,
        authority_share_pct,
    };
    let id = db::distributions::insert(pool, &new, Utc::now().timestamp()).await?;

    info!(
        "Distribution {id} recorded for project {project_id}: {total_credits} credits \
         (officer {officer_credits}, authority {authority_credits})"
    );
    db::distributions::get(pool, id).await
}

/// Mark a distribution as distributed. Repeating the call leaves the record
/// untouched and returns it as-is.
pub async fn finalize(pool: &SqlitePool, caller: &Caller, distribution_id: i64) -> Result<CreditDistribution> {
    auth::require(caller, &[Role::Admin, Role::Officer])?;

    let distribution = db::distributions::get(pool, distribution_id).await?;
    if caller.role == Role::Officer && distribution.officer_id != caller.user_id {
        return Err(RegistryError::Unauthorized(format!(
            "user {} is not the officer of distribution {distribution_id}",
            caller.user_id
        )));
    }

    let now = Utc::now().timestamp();
    if db::distributions::mark_distributed(pool, distribution_id, now).await? {
        info!("Distribution {distribution_id} finalized by user {}", caller.user_id);
    } else {
        info!("Distribution {distribution_id} was already distributed; unchanged");
    }
    db::distributions::get(pool, distribution_id).await
}

pub async fn get(pool: &SqlitePool, caller: &Caller, distribution_id: i64) -> Result<CreditDistribution> {
    let distribution = db::distributions::get(pool, distribution_id).await?;
    if !Scope::for_caller(caller).admits_distribution(&distribution) {
        return Err(RegistryError::NotFound(format!("distribution {distribution_id}")));
    }
    Ok(distribution)
}

pub async fn list(
    pool: &SqlitePool,
    caller: &Caller,
    page: &PageRequest,
    limits: PageLimits,
) -> Result<Page<CreditDistribution>> {
    let (offset, limit) = page.resolve(limits)?;
    let items = db::distributions::list(pool, Scope::for_caller(caller), offset, limit).await?;
    Ok(Page::new(items, offset, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConflictKind;
    use crate::models::UserId;
    use crate::test_support::{self as ts, caller};

    fn distribution(officer: UserId, authority: UserId, total: f64, status: DistributionStatus) -> CreditDistribution {
        CreditDistribution {
            id: 0,
            project_id: 0,
            officer_id: officer,
            authority_id: authority,
            total_credits: total,
            officer_share_pct: 10.0,
            authority_share_pct: 80.0,
            status,
            created_at: 0,
            distributed_at: None,
        }
    }

    #[test]
    fn default_policy_split() {
        assert_eq!(compute_shares(1000.0, 10.0, 80.0).unwrap(), (100.0, 800.0));
    }

    #[test]
    fn oversubscribed_shares_are_invalid() {
        let err = compute_shares(1000.0, 70.0, 40.0).unwrap_err();
        assert!(matches!(err, RegistryError::IncompleteData { field: "shares", .. }));
        assert!(err.to_string().contains("InvalidShares"));
        assert!(compute_shares(1000.0, -1.0, 50.0).is_err());
        assert_eq!(compute_shares(1000.0, 20.0, 80.0).unwrap(), (200.0, 800.0));
    }

    #[test]
    fn share_totals_only_count_distributed_records_of_the_caller() {
        let records = [
            distribution(1, 9, 500.0, DistributionStatus::Distributed),
            distribution(1, 8, 1000.0, DistributionStatus::Pending),
            distribution(2, 9, 200.0, DistributionStatus::Distributed),
        ];
        let officer = share_totals(Scope::Officer(1), &records);
        assert_eq!(officer.total_credits, 50.0);
        assert_eq!(officer.available_credits, 50.0);

        let authority = share_totals(Scope::Authority(9), &records);
        assert_eq!(authority.total_credits, 560.0);

        assert_eq!(share_totals(Scope::Officer(3), &records).total_credits, 0.0);
        assert_eq!(share_totals(Scope::All, &records).total_credits, 700.0);
    }

    #[test]
    fn admin_totals_subtract_burned() {
        let totals = admin_totals(&Supply { minted: 900.0, burned: 150.0 });
        assert_eq!(totals.total_credits, 900.0);
        assert_eq!(totals.available_credits, 750.0);
    }

    #[tokio::test]
    async fn distribution_requires_verified_project() {
        let pool = ts::pool().await;
        let admin = ts::admin(&pool, "root@x.org").await;
        let (project, _) = ts::project_in_verification(&pool).await;

        let err = create_distribution(
            &pool,
            &caller(admin, Role::Admin),
            project,
            DistributionRequest::default(),
            SharePolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidState(StateViolation::NotVerified)
        ));
    }

    #[tokio::test]
    async fn finalize_twice_does_not_double_count() {
        let pool = ts::pool().await;
        let admin = ts::admin(&pool, "root@x.org").await;
        let (project, officer) = ts::verified_project(&pool, 500.0).await;
        let admin_caller = caller(admin, Role::Admin);

        let d = create_distribution(
            &pool,
            &admin_caller,
            project,
            DistributionRequest::default(),
            SharePolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(d.status, DistributionStatus::Pending);
        assert_eq!(d.total_credits, 500.0);

        let again = create_distribution(
            &pool,
            &admin_caller,
            project,
            DistributionRequest::default(),
            SharePolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            again,
            RegistryError::Conflict(ConflictKind::DistributionExists)
        ));

        let first = finalize(&pool, &admin_caller, d.id).await.unwrap();
        let second = finalize(&pool, &admin_caller, d.id).await.unwrap();
        assert_eq!(first.status, DistributionStatus::Distributed);
        assert_eq!(first.distributed_at, second.distributed_at);

        let officer_caller = caller(officer, Role::Officer);
        let ledger = LedgerClient::local();
        let totals = credit_stats(&pool, &ledger, &officer_caller).await.unwrap();
        assert_eq!(totals.total_credits, 50.0);
    }

    #[tokio::test]
    async fn overridden_shares_are_validated() {
        let pool = ts::pool().await;
        let (project, officer) = ts::verified_project(&pool, 1000.0).await;

        let err = create_distribution(
            &pool,
            &caller(officer, Role::Officer),
            project,
            DistributionRequest {
                officer_share_pct: Some(70.0),
                authority_share_pct: Some(40.0),
                ..Default::default()
            },
            SharePolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::IncompleteData { field: "shares", .. }));
    }

    #[tokio::test]
    async fn authorities_cannot_distribute_or_see_others() {
        let pool = ts::pool().await;
        let admin = ts::admin(&pool, "root@x.org").await;
        let (project, _) = ts::verified_project(&pool, 100.0).await;
        let owner = db::projects::get(&pool, project).await.unwrap().owner_id;
        let stranger = ts::authority(&pool, "stranger@x.org").await;

        let err = create_distribution(
            &pool,
            &caller(owner, Role::ProjectAuthority),
            project,
            DistributionRequest::default(),
            SharePolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized(_)));

        let d = create_distribution(
            &pool,
            &caller(admin, Role::Admin),
            project,
            DistributionRequest::default(),
            SharePolicy::default(),
        )
        .await
        .unwrap();
        assert!(get(&pool, &caller(owner, Role::ProjectAuthority), d.id).await.is_ok());
        assert!(matches!(
            get(&pool, &caller(stranger, Role::ProjectAuthority), d.id).await,
            Err(RegistryError::NotFound(_))
        ));

        let limits = PageLimits { default_size: 10, max_size: 10 };
        let theirs = list(&pool, &caller(stranger, Role::ProjectAuthority), &PageRequest::default(), limits)
            .await
            .unwrap();
        assert_eq!(theirs.count, 0);
    }
}
