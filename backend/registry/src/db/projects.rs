//! Project queries and guarded project writes.

use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};

use crate::auth::Scope;
use crate::errors::{RegistryError, Result};
use crate::lifecycle::{ProjectState, VerificationStatus};
use crate::models::{Location, Project, ProjectId, UserId};
use crate::projects::{NewProject, ProjectUpdate};

const PROJECT_COLUMNS: &str = r#"
    id, name, description, category, start_date, end_date,
    address, city, state, country, land_area, land_area_unit,
    estimated_credits, documents, images, owner_id, assigned_officer,
    verification_status, decided_by, decided_at, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    description: String,
    category: String,
    start_date: String,
    end_date: String,
    address: String,
    city: String,
    state: String,
    country: String,
    land_area: f64,
    land_area_unit: String,
    estimated_credits: f64,
    documents: String,
    images: String,
    owner_id: i64,
    assigned_officer: Option<i64>,
    verification_status: String,
    decided_by: Option<i64>,
    decided_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ProjectRow> for Project {
    type Error = RegistryError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Project {
            state: ProjectState::from_columns(
                &row.verification_status,
                row.decided_by,
                row.decided_at,
            )?,
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            start_date: row.start_date,
            end_date: row.end_date,
            location: Location {
                address: row.address,
                city: row.city,
                state: row.state,
                country: row.country,
            },
            land_area: row.land_area,
            land_area_unit: row.land_area_unit,
            estimated_credits: row.estimated_credits,
            documents: serde_json::from_str(&row.documents)?,
            images: serde_json::from_str(&row.images)?,
            owner_id: row.owner_id,
            assigned_officer: row.assigned_officer,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn find<'e>(exec: impl SqliteExecutor<'e>, id: ProjectId) -> Result<Option<Project>> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;
    row.map(Project::try_from).transpose()
}

pub async fn get<'e>(exec: impl SqliteExecutor<'e>, id: ProjectId) -> Result<Project> {
    find(exec, id)
        .await?
        .ok_or_else(|| RegistryError::NotFound(format!("project {id}")))
}

/// One page of the projects visible under `scope`, ordered by id.
pub async fn list(
    pool: &SqlitePool,
    scope: Scope,
    offset: i64,
    limit: u32,
) -> Result<Vec<Project>> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE 1 = 1"
    ));
    scope.push_project_filter(&mut qb);
    qb.push(" ORDER BY id ASC LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build_query_as::<ProjectRow>().fetch_all(pool).await?;
    rows.into_iter().map(Project::try_from).collect()
}

/// `(verification_status, count)` for the projects visible under `scope`.
pub async fn count_by_verification_status(
    pool: &SqlitePool,
    scope: Scope,
) -> Result<Vec<(String, i64)>> {
    let mut qb: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT verification_status, COUNT(*) FROM projects WHERE 1 = 1");
    scope.push_project_filter(&mut qb);
    qb.push(" GROUP BY verification_status");

    Ok(qb.build_query_as::<(String, i64)>().fetch_all(pool).await?)
}

/// Projects that have an officer but whose verification has not started.
pub async fn count_assigned_pending(pool: &SqlitePool, scope: Scope) -> Result<i64> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT COUNT(*) FROM projects WHERE verification_status = 'pending' \
         AND assigned_officer IS NOT NULL",
    );
    scope.push_project_filter(&mut qb);

    let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

pub async fn insert<'e>(
    exec: impl SqliteExecutor<'e>,
    project: &NewProject,
    owner_id: UserId,
    now: i64,
) -> Result<ProjectId> {
    let id = sqlx::query(
        r#"
        INSERT INTO projects
            (name, description, category, start_date, end_date,
             address, city, state, country, land_area, land_area_unit,
             estimated_credits, documents, images, owner_id,
             verification_status, lifecycle_status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                'pending', 'pending', ?16, ?16)
        "#,
    )
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.category)
    .bind(&project.start_date)
    .bind(&project.end_date)
    .bind(&project.location.address)
    .bind(&project.location.city)
    .bind(&project.location.state)
    .bind(&project.location.country)
    .bind(project.land_area)
    .bind(&project.land_area_unit)
    .bind(project.estimated_credits)
    .bind(serde_json::to_string(&project.documents)?)
    .bind(serde_json::to_string(&project.images)?)
    .bind(owner_id)
    .bind(now)
    .execute(exec)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Set the officer only while none is assigned. Returns `false` if another
/// writer got there first (or the project is gone).
pub async fn set_officer<'e>(
    exec: impl SqliteExecutor<'e>,
    id: ProjectId,
    officer_id: UserId,
    now: i64,
) -> Result<bool> {
    let affected = sqlx::query(
        "UPDATE projects SET assigned_officer = ?1, updated_at = ?2 \
         WHERE id = ?3 AND assigned_officer IS NULL",
    )
    .bind(officer_id)
    .bind(now)
    .bind(id)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// Clear the officer, only while verification has not started.
pub async fn clear_officer<'e>(
    exec: impl SqliteExecutor<'e>,
    id: ProjectId,
    now: i64,
) -> Result<bool> {
    let affected = sqlx::query(
        "UPDATE projects SET assigned_officer = NULL, updated_at = ?1 \
         WHERE id = ?2 AND verification_status = 'pending'",
    )
    .bind(now)
    .bind(id)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// Move a project from `from` to `to`, guarded on the current verification
/// status and on `officer_id` still being the assigned officer.
pub async fn transition<'e>(
    exec: impl SqliteExecutor<'e>,
    id: ProjectId,
    officer_id: UserId,
    from: &ProjectState,
    to: &ProjectState,
    now: i64,
) -> Result<bool> {
    let decided = to.decided();
    let affected = sqlx::query(
        r#"
        UPDATE projects
        SET    verification_status = ?1, lifecycle_status = ?2,
               decided_by = ?3, decided_at = ?4, updated_at = ?5
        WHERE  id = ?6 AND assigned_officer = ?7 AND verification_status = ?8
        "#,
    )
    .bind(to.verification_status().as_str())
    .bind(to.lifecycle_status().as_str())
    .bind(decided.map(|(by, _)| by))
    .bind(decided.map(|(_, at)| at))
    .bind(now)
    .bind(id)
    .bind(officer_id)
    .bind(from.verification_status().as_str())
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// Overwrite descriptive fields. Authority edits additionally require the
/// project to be unassigned; both kinds require no recorded decision.
pub async fn update_details<'e>(
    exec: impl SqliteExecutor<'e>,
    id: ProjectId,
    update: &ProjectUpdate,
    require_unassigned: bool,
    now: i64,
) -> Result<bool> {
    let affected = sqlx::query(
        r#"
        UPDATE projects
        SET    name = COALESCE(?1, name),
               description = COALESCE(?2, description),
               category = COALESCE(?3, category),
               start_date = COALESCE(?4, start_date),
               end_date = COALESCE(?5, end_date),
               land_area = COALESCE(?6, land_area),
               land_area_unit = COALESCE(?7, land_area_unit),
               estimated_credits = COALESCE(?8, estimated_credits),
               documents = COALESCE(?9, documents),
               images = COALESCE(?10, images),
               updated_at = ?11
        WHERE  id = ?12
          AND  verification_status IN ('pending', 'in_progress')
          AND  (?13 = 0 OR (assigned_officer IS NULL AND verification_status = 'pending'))
        "#,
    )
    .bind(&update.name)
    .bind(&update.description)
    .bind(&update.category)
    .bind(&update.start_date)
    .bind(&update.end_date)
    .bind(update.land_area)
    .bind(&update.land_area_unit)
    .bind(update.estimated_credits)
    .bind(update.documents.as_ref().map(serde_json::to_string).transpose()?)
    .bind(update.images.as_ref().map(serde_json::to_string).transpose()?)
    .bind(now)
    .bind(id)
    .bind(require_unassigned)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// Delete a project that has not been verified. Reports and distributions
/// cascade with it.
pub async fn delete_unverified<'e>(exec: impl SqliteExecutor<'e>, id: ProjectId) -> Result<bool> {
    let affected = sqlx::query("DELETE FROM projects WHERE id = ?1 AND verification_status != ?2")
        .bind(id)
        .bind(VerificationStatus::Verified.as_str())
        .execute(exec)
        .await?
        .rows_affected();
    Ok(affected == 1)
}
