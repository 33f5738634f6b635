//! Credit distribution queries.

use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};

use crate::auth::Scope;
use crate::db::is_unique_violation;
use crate::errors::{ConflictKind, RegistryError, Result};
use crate::models::{CreditDistribution, DistributionStatus, ProjectId, UserId};

const DISTRIBUTION_COLUMNS: &str = r#"
    id, project_id, officer_id, authority_id, total_credits,
    officer_share_pct, authority_share_pct, status, created_at, distributed_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct DistributionRow {
    id: i64,
    project_id: i64,
    officer_id: i64,
    authority_id: i64,
    total_credits: f64,
    officer_share_pct: f64,
    authority_share_pct: f64,
    status: String,
    created_at: i64,
    distributed_at: Option<i64>,
}

impl TryFrom<DistributionRow> for CreditDistribution {
    type Error = RegistryError;

    fn try_from(row: DistributionRow) -> Result<Self> {
        Ok(CreditDistribution {
            id: row.id,
            project_id: row.project_id,
            officer_id: row.officer_id,
            authority_id: row.authority_id,
            total_credits: row.total_credits,
            officer_share_pct: row.officer_share_pct,
            authority_share_pct: row.authority_share_pct,
            status: DistributionStatus::parse(&row.status)?,
            created_at: row.created_at,
            distributed_at: row.distributed_at,
        })
    }
}

/// Fields of a distribution that is about to be recorded.
#[derive(Debug, Clone)]
pub struct NewDistribution {
    pub project_id: ProjectId,
    pub officer_id: UserId,
    pub authority_id: UserId,
    pub total_credits: f64,
    pub officer_share_pct: f64,
    pub authority_share_pct: f64,
}

pub async fn insert<'e>(
    exec: impl SqliteExecutor<'e>,
    new: &NewDistribution,
    now: i64,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO credit_distributions
            (project_id, officer_id, authority_id, total_credits,
             officer_share_pct, authority_share_pct, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(new.project_id)
    .bind(new.officer_id)
    .bind(new.authority_id)
    .bind(new.total_credits)
    .bind(new.officer_share_pct)
    .bind(new.authority_share_pct)
    .bind(DistributionStatus::Pending.as_str())
    .bind(now)
    .execute(exec)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => {
            Err(RegistryError::Conflict(ConflictKind::DistributionExists))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get<'e>(exec: impl SqliteExecutor<'e>, id: i64) -> Result<CreditDistribution> {
    let row = sqlx::query_as::<_, DistributionRow>(&format!(
        "SELECT {DISTRIBUTION_COLUMNS} FROM credit_distributions WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;
    row.map(CreditDistribution::try_from)
        .transpose()?
        .ok_or_else(|| RegistryError::NotFound(format!("distribution {id}")))
}

/// `pending → distributed`. Returns `false` when the record was already
/// distributed, so a repeated finalize changes nothing.
pub async fn mark_distributed<'e>(exec: impl SqliteExecutor<'e>, id: i64, now: i64) -> Result<bool> {
    let affected = sqlx::query(
        "UPDATE credit_distributions SET status = ?1, distributed_at = ?2 \
         WHERE id = ?3 AND status = ?4",
    )
    .bind(DistributionStatus::Distributed.as_str())
    .bind(now)
    .bind(id)
    .bind(DistributionStatus::Pending.as_str())
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// One page of distributions visible under `scope`, ordered by id.
pub async fn list(
    pool: &SqlitePool,
    scope: Scope,
    offset: i64,
    limit: u32,
) -> Result<Vec<CreditDistribution>> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {DISTRIBUTION_COLUMNS} FROM credit_distributions WHERE 1 = 1"
    ));
    scope.push_distribution_filter(&mut qb);
    qb.push(" ORDER BY id ASC LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb
        .build_query_as::<DistributionRow>()
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(CreditDistribution::try_from).collect()
}

/// Every distributed record visible under `scope`.
pub async fn list_distributed(pool: &SqlitePool, scope: Scope) -> Result<Vec<CreditDistribution>> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {DISTRIBUTION_COLUMNS} FROM credit_distributions WHERE status = "
    ));
    qb.push_bind(DistributionStatus::Distributed.as_str());
    scope.push_distribution_filter(&mut qb);
    qb.push(" ORDER BY id ASC");

    let rows = qb
        .build_query_as::<DistributionRow>()
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(CreditDistribution::try_from).collect()
}

/// Sum of `total_credits` over all distributed records.
pub async fn sum_distributed_totals(pool: &SqlitePool) -> Result<f64> {
    let (sum,): (Option<f64>,) =
        sqlx::query_as("SELECT SUM(total_credits) FROM credit_distributions WHERE status = ?1")
            .bind(DistributionStatus::Distributed.as_str())
            .fetch_one(pool)
            .await?;
    Ok(sum.unwrap_or(0.0))
}
