//! Verification report queries. Reports are insert-only.

use sqlx::SqliteExecutor;

use crate::db::is_unique_violation;
use crate::errors::{ConflictKind, RegistryError, Result};
use crate::models::{Decision, Measurements, ProjectId, UserId, VerificationReport};

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: i64,
    project_id: i64,
    officer_id: i64,
    measured_area: f64,
    plot_count: i64,
    sampling_flights: i64,
    measured_biomass: f64,
    uncertainty_pct: f64,
    recommended_credits: f64,
    decision: String,
    submitted_at: i64,
}

impl TryFrom<ReportRow> for VerificationReport {
    type Error = RegistryError;

    fn try_from(row: ReportRow) -> Result<Self> {
        Ok(VerificationReport {
            id: row.id,
            project_id: row.project_id,
            officer_id: row.officer_id,
            measurements: Measurements {
                measured_area: row.measured_area,
                plot_count: row.plot_count,
                sampling_flights: row.sampling_flights,
                measured_biomass: row.measured_biomass,
                uncertainty_pct: row.uncertainty_pct,
                recommended_credits: row.recommended_credits,
            },
            decision: Decision::parse(&row.decision)?,
            submitted_at: row.submitted_at,
        })
    }
}

/// Insert a report. The `UNIQUE(project_id)` constraint turns a second
/// report for the same project into [`ConflictKind::DuplicateReport`].
pub async fn insert<'e>(
    exec: impl SqliteExecutor<'e>,
    project_id: ProjectId,
    officer_id: UserId,
    m: &Measurements,
    decision: Decision,
    submitted_at: i64,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO verification_reports
            (project_id, officer_id, measured_area, plot_count, sampling_flights,
             measured_biomass, uncertainty_pct, recommended_credits, decision, submitted_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(project_id)
    .bind(officer_id)
    .bind(m.measured_area)
    .bind(m.plot_count)
    .bind(m.sampling_flights)
    .bind(m.measured_biomass)
    .bind(m.uncertainty_pct)
    .bind(m.recommended_credits)
    .bind(decision.as_str())
    .bind(submitted_at)
    .execute(exec)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => {
            Err(RegistryError::Conflict(ConflictKind::DuplicateReport))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn find_for_project<'e>(
    exec: impl SqliteExecutor<'e>,
    project_id: ProjectId,
) -> Result<Option<VerificationReport>> {
    let row = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT id, project_id, officer_id, measured_area, plot_count, sampling_flights,
               measured_biomass, uncertainty_pct, recommended_credits, decision, submitted_at
        FROM   verification_reports
        WHERE  project_id = ?1
        "#,
    )
    .bind(project_id)
    .fetch_optional(exec)
    .await?;
    row.map(VerificationReport::try_from).transpose()
}

pub async fn exists_for_project<'e>(
    exec: impl SqliteExecutor<'e>,
    project_id: ProjectId,
) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM verification_reports WHERE project_id = ?1")
            .bind(project_id)
            .fetch_optional(exec)
            .await?;
    Ok(row.is_some())
}
