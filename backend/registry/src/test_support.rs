//! Fixtures shared by the unit tests: an in-memory database and helpers that
//! seed users and projects directly through the db layer.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::auth::Caller;
use crate::db;
use crate::lifecycle;
use crate::models::{Decision, Location, ProjectId, Role, UserId};
use crate::projects::NewProject;
use crate::reports::{self, MeasurementInput, ReportSubmission};
use crate::users::NewUser;

/// A fresh migrated database. One connection, so every test sees the same
/// in-memory file and concurrent operations serialize on it.
pub async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&pool).await.unwrap();
    pool
}

/// A migrated database file opened through the production pool settings
/// (several connections, WAL), for tests that need real lock contention.
/// Keep the returned directory alive for as long as the pool is used.
pub async fn file_pool() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");
    let pool = db::init_pool(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    (dir, pool)
}

pub fn caller(user_id: UserId, role: Role) -> Caller {
    Caller { user_id, role }
}

async fn user(pool: &SqlitePool, email: &str, role: Role, jurisdiction: Option<&str>, specs: &[&str]) -> UserId {
    let new = NewUser {
        name: email.split('@').next().unwrap_or("user").to_string(),
        email: email.to_string(),
        role,
        jurisdiction: jurisdiction.map(String::from),
        specializations: specs.iter().map(|s| s.to_string()).collect(),
        access_token: None,
    };
    db::users::insert(pool, &new, 0).await.unwrap()
}

pub async fn admin(pool: &SqlitePool, email: &str) -> UserId {
    user(pool, email, Role::Admin, None, &[]).await
}

pub async fn authority(pool: &SqlitePool, email: &str) -> UserId {
    user(pool, email, Role::ProjectAuthority, None, &[]).await
}

pub async fn officer(pool: &SqlitePool, email: &str, jurisdiction: &str, specs: &[&str]) -> UserId {
    user(pool, email, Role::Officer, Some(jurisdiction), specs).await
}

pub fn new_project(city: &str, category: &str) -> NewProject {
    NewProject {
        name: "Sahyadri Reforestation".to_string(),
        description: "Native species planting on degraded slopes".to_string(),
        category: category.to_string(),
        start_date: "2025-06-01".to_string(),
        end_date: "2030-06-01".to_string(),
        location: Location {
            address: "Survey No. 12".to_string(),
            city: city.to_string(),
            state: "Maharashtra".to_string(),
            country: "India".to_string(),
        },
        land_area: 120.0,
        land_area_unit: "ha".to_string(),
        estimated_credits: 2400.0,
        documents: vec!["s3://docs/deed.pdf".to_string()],
        images: vec!["s3://img/site-1.jpg".to_string()],
    }
}

/// Insert a project without running the resolver.
pub async fn unassigned_project(pool: &SqlitePool, owner: UserId, city: &str, category: &str) -> ProjectId {
    db::projects::insert(pool, &new_project(city, category), owner, 0)
        .await
        .unwrap()
}

pub async fn assign(pool: &SqlitePool, project: ProjectId, officer: UserId) {
    assert!(db::projects::set_officer(pool, project, officer, 0).await.unwrap());
}

/// An assigned project whose officer has started verification.
pub async fn project_in_verification(pool: &SqlitePool) -> (ProjectId, UserId) {
    let owner = authority(pool, "owner@x.org").await;
    let officer = officer(pool, "field@x.org", "Pune", &["forestry"]).await;
    let project = unassigned_project(pool, owner, "Pune", "forestry").await;
    assign(pool, project, officer).await;
    lifecycle::start_verification(pool, &caller(officer, Role::Officer), project)
        .await
        .unwrap();
    (project, officer)
}

/// A verified project whose report recommends `credits`.
pub async fn verified_project(pool: &SqlitePool, credits: f64) -> (ProjectId, UserId) {
    let (project, officer) = project_in_verification(pool).await;
    let submission = ReportSubmission {
        measurements: MeasurementInput {
            measured_area: Some(118.0),
            plot_count: Some(24),
            sampling_flights: Some(2),
            measured_biomass: Some(95.5),
            uncertainty_pct: Some(6.0),
            recommended_credits: Some(credits),
        },
        decision: Decision::Approve,
    };
    reports::submit(pool, &caller(officer, Role::Officer), project, submission)
        .await
        .unwrap();
    (project, officer)
}
