//! Verification report intake.
//!
//! A report is accepted only from the project's assigned officer while the
//! project is `in_progress`. Storing the report and moving the project to its
//! decided state happen in one transaction whose first statement is the
//! guarded status update, so concurrent submissions for the same project
//! serialize on it and exactly one of them wins.

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::auth::{self, Caller, Scope};
use crate::db;
use crate::errors::{ConflictKind, RegistryError, Result, StateViolation};
use crate::lifecycle::{self, ProjectState};
use crate::models::{Decision, Measurements, Project, ProjectId, Role, VerificationReport};

/// Officer-submitted field data, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementInput {
    pub measured_area: Option<f64>,
    pub plot_count: Option<i64>,
    pub sampling_flights: Option<i64>,
    pub measured_biomass: Option<f64>,
    pub uncertainty_pct: Option<f64>,
    pub recommended_credits: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportSubmission {
    #[serde(flatten)]
    pub measurements: MeasurementInput,
    pub decision: Decision,
}

fn present<T>(field: &'static str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| RegistryError::incomplete(field, "is missing"))
}

fn amount(field: &'static str, value: Option<f64>) -> Result<f64> {
    let v = present(field, value)?;
    if !v.is_finite() || v < 0.0 {
        return Err(RegistryError::incomplete(field, "must be non-negative"));
    }
    Ok(v)
}

fn count(field: &'static str, value: Option<i64>) -> Result<i64> {
    let v = present(field, value)?;
    if v < 0 {
        return Err(RegistryError::incomplete(field, "must be non-negative"));
    }
    Ok(v)
}

impl MeasurementInput {
    /// Every field present and non-negative, uncertainty within `[0, 100]`.
    pub fn validate(&self) -> Result<Measurements> {
        let uncertainty_pct = amount("uncertainty_pct", self.uncertainty_pct)?;
        if uncertainty_pct > 100.0 {
            return Err(RegistryError::incomplete(
                "uncertainty_pct",
                "must be within [0, 100]",
            ));
        }
        Ok(Measurements {
            measured_area: amount("measured_area", self.measured_area)?,
            plot_count: count("plot_count", self.plot_count)?,
            sampling_flights: count("sampling_flights", self.sampling_flights)?,
            measured_biomass: amount("measured_biomass", self.measured_biomass)?,
            uncertainty_pct,
            recommended_credits: amount("recommended_credits", self.recommended_credits)?,
        })
    }
}

/// Checks (a) and (b): the caller is the assigned officer and verification
/// is running. A project that already carries a decision reports the
/// duplicate rather than the generic state error.
fn check_submittable(project: &Project, caller: &Caller, report_exists: bool) -> Result<()> {
    if project.assigned_officer != Some(caller.user_id) {
        return Err(RegistryError::Unauthorized(format!(
            "user {} is not the assigned officer of project {}",
            caller.user_id, project.id
        )));
    }
    match project.state {
        ProjectState::InVerification => Ok(()),
        ProjectState::Approved { .. } | ProjectState::Rejected { .. } if report_exists => {
            Err(RegistryError::Conflict(ConflictKind::DuplicateReport))
        }
        _ => Err(RegistryError::InvalidState(StateViolation::NotInProgress)),
    }
}

/// Accept a report and apply its decision to the project.
pub async fn submit(
    pool: &SqlitePool,
    caller: &Caller,
    project_id: ProjectId,
    submission: ReportSubmission,
) -> Result<VerificationReport> {
    auth::require(caller, &[Role::Officer])?;

    let project = db::projects::get(pool, project_id).await?;
    let report_exists = db::reports::exists_for_project(pool, project_id).await?;
    check_submittable(&project, caller, report_exists)?;
    let measurements = submission.measurements.validate()?;

    let now = Utc::now().timestamp();
    let next = lifecycle::check_decision(
        &project,
        report_exists,
        submission.decision,
        caller.user_id,
        now,
    )?;

    let mut tx = pool.begin().await?;
    let won = db::projects::transition(
        &mut *tx,
        project_id,
        caller.user_id,
        &project.state,
        &next,
        now,
    )
    .await?;
    if !won {
        tx.rollback().await?;
        warn!("Lost report race on project {project_id}");
        return Err(classify_lost_race(pool, caller, project_id).await);
    }
    let report_id = db::reports::insert(
        &mut *tx,
        project_id,
        caller.user_id,
        &measurements,
        submission.decision,
        now,
    )
    .await?;
    tx.commit().await?;

    info!(
        "Officer {} filed report {report_id} on project {project_id}: {} ({} credits recommended)",
        caller.user_id,
        submission.decision.as_str(),
        measurements.recommended_credits
    );

    Ok(VerificationReport {
        id: report_id,
        project_id,
        officer_id: caller.user_id,
        measurements,
        decision: submission.decision,
        submitted_at: now,
    })
}

/// Explain why the guarded transition matched no row.
async fn classify_lost_race(pool: &SqlitePool, caller: &Caller, project_id: ProjectId) -> RegistryError {
    let fresh = match db::projects::get(pool, project_id).await {
        Ok(p) => p,
        Err(e) => return e,
    };
    let report_exists = match db::reports::exists_for_project(pool, project_id).await {
        Ok(b) => b,
        Err(e) => return e,
    };
    match check_submittable(&fresh, caller, report_exists) {
        Err(e) => e,
        Ok(()) => RegistryError::Conflict(ConflictKind::StateChanged),
    }
}

/// The report of a project the caller can see.
pub async fn get_for_project(
    pool: &SqlitePool,
    caller: &Caller,
    project_id: ProjectId,
) -> Result<VerificationReport> {
    let project = db::projects::get(pool, project_id).await?;
    if !Scope::for_caller(caller).admits_project(&project) {
        return Err(RegistryError::NotFound(format!("project {project_id}")));
    }
    db::reports::find_for_project(pool, project_id)
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("report for project {project_id}")))
}
