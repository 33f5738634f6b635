//! Project submission, scoped reads, edits and deletion.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::assignment::{self, Resolution};
use crate::auth::{self, Caller, Scope};
use crate::db;
use crate::errors::{ConflictKind, RegistryError, Result, StateViolation};
use crate::lifecycle::ProjectState;
use crate::models::{Location, Project, ProjectId, Role};
use crate::pagination::{Page, PageLimits, PageRequest};

/// A project as submitted by an authority (or an admin on its behalf).
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub start_date: String,
    pub end_date: String,
    pub location: Location,
    pub land_area: f64,
    pub land_area_unit: String,
    pub estimated_credits: f64,
    /// References returned by the object store, in upload order.
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Descriptive fields an owner or admin may change. Location and ownership
/// are fixed once the resolver has run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub land_area: Option<f64>,
    pub land_area_unit: Option<String>,
    pub estimated_credits: Option<f64>,
    pub documents: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(RegistryError::incomplete(field, "must not be empty"));
    }
    Ok(v.to_string())
}

fn non_negative(field: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(RegistryError::incomplete(field, "must be a non-negative number"));
    }
    Ok(value)
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| RegistryError::incomplete(field, "must be a YYYY-MM-DD date"))
}

fn check_date_order(start: &str, end: &str) -> Result<()> {
    if parse_date("start_date", start)? > parse_date("end_date", end)? {
        return Err(RegistryError::incomplete("end_date", "must not precede start_date"));
    }
    Ok(())
}

fn references(field: &'static str, refs: &[String]) -> Result<Vec<String>> {
    refs.iter().map(|r| required(field, r)).collect()
}

impl NewProject {
    pub fn validated(self) -> Result<Self> {
        let start_date = required("start_date", &self.start_date)?;
        let end_date = required("end_date", &self.end_date)?;
        check_date_order(&start_date, &end_date)?;

        Ok(NewProject {
            name: required("name", &self.name)?,
            description: self.description.trim().to_string(),
            category: required("category", &self.category)?,
            start_date,
            end_date,
            location: Location {
                address: self.location.address.trim().to_string(),
                city: required("city", &self.location.city)?,
                state: self.location.state.trim().to_string(),
                country: required("country", &self.location.country)?,
            },
            land_area: non_negative("land_area", self.land_area)?,
            land_area_unit: required("land_area_unit", &self.land_area_unit)?,
            estimated_credits: non_negative("estimated_credits", self.estimated_credits)?,
            documents: references("documents", &self.documents)?,
            images: references("images", &self.images)?,
        })
    }
}

impl ProjectUpdate {
    /// Validate present fields against the project they will be applied to.
    pub fn validated(self, current: &Project) -> Result<Self> {
        let opt = |field, v: &Option<String>| v.as_deref().map(|s| required(field, s)).transpose();
        let update = ProjectUpdate {
            name: opt("name", &self.name)?,
            description: self.description.map(|d| d.trim().to_string()),
            category: opt("category", &self.category)?,
            start_date: opt("start_date", &self.start_date)?,
            end_date: opt("end_date", &self.end_date)?,
            land_area: self.land_area.map(|v| non_negative("land_area", v)).transpose()?,
            land_area_unit: opt("land_area_unit", &self.land_area_unit)?,
            estimated_credits: self
                .estimated_credits
                .map(|v| non_negative("estimated_credits", v))
                .transpose()?,
            documents: self.documents.as_deref().map(|d| references("documents", d)).transpose()?,
            images: self.images.as_deref().map(|i| references("images", i)).transpose()?,
        };
        check_date_order(
            update.start_date.as_deref().unwrap_or(&current.start_date),
            update.end_date.as_deref().unwrap_or(&current.end_date),
        )?;
        Ok(update)
    }
}

/// Submit a project and run the officer resolver, as one unit of work.
pub async fn create(pool: &SqlitePool, caller: &Caller, new: NewProject) -> Result<Project> {
    auth::require(caller, &[Role::ProjectAuthority, Role::Admin])?;
    let new = new.validated()?;

    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;
    let id = db::projects::insert(&mut *tx, &new, caller.user_id, now).await?;
    let project = db::projects::get(&mut *tx, id).await?;
    let resolution = assignment::auto_assign(&mut *tx, &project).await?;
    let project = match resolution {
        Resolution::Officer(_) => db::projects::get(&mut *tx, id).await?,
        Resolution::NoneAvailable => project,
    };
    tx.commit().await?;

    info!(
        "User {} submitted project {id} ({}, {})",
        caller.user_id, project.category, project.location.city
    );
    Ok(project)
}

/// A single project, if the caller's scope admits it.
pub async fn get(pool: &SqlitePool, caller: &Caller, id: ProjectId) -> Result<Project> {
    let project = db::projects::get(pool, id).await?;
    if !Scope::for_caller(caller).admits_project(&project) {
        return Err(RegistryError::NotFound(format!("project {id}")));
    }
    Ok(project)
}

pub async fn list(
    pool: &SqlitePool,
    caller: &Caller,
    page: &PageRequest,
    limits: PageLimits,
) -> Result<Page<Project>> {
    let (offset, limit) = page.resolve(limits)?;
    let items = db::projects::list(pool, Scope::for_caller(caller), offset, limit).await?;
    Ok(Page::new(items, offset, limit))
}

/// Owners may edit while the project is unassigned and pending; admins until
/// a decision is recorded.
pub async fn update(
    pool: &SqlitePool,
    caller: &Caller,
    id: ProjectId,
    update: ProjectUpdate,
) -> Result<Project> {
    let project = db::projects::get(pool, id).await?;
    auth::require_owner_or_admin(caller, &project)?;

    if project.state.is_terminal() {
        return Err(RegistryError::InvalidState(StateViolation::AlreadyDecided));
    }
    let owner_edit = caller.role != Role::Admin;
    if owner_edit && (project.assigned_officer.is_some() || project.state != ProjectState::Pending)
    {
        return Err(RegistryError::InvalidState(StateViolation::AssignmentLocked));
    }

    let update = update.validated(&project)?;
    let now = Utc::now().timestamp();
    if !db::projects::update_details(pool, id, &update, owner_edit, now).await? {
        return Err(RegistryError::Conflict(ConflictKind::StateChanged));
    }

    info!("User {} updated project {id}", caller.user_id);
    db::projects::get(pool, id).await
}

/// Admins and the owning authority may delete a project until it is verified.
pub async fn delete(pool: &SqlitePool, caller: &Caller, id: ProjectId) -> Result<()> {
    let project = db::projects::get(pool, id).await?;
    auth::require_owner_or_admin(caller, &project)?;

    if matches!(project.state, ProjectState::Approved { .. }) {
        return Err(RegistryError::InvalidState(StateViolation::AlreadyVerified));
    }
    if !db::projects::delete_unverified(pool, id).await? {
        return Err(RegistryError::Conflict(ConflictKind::StateChanged));
    }

    info!("User {} deleted project {id}", caller.user_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self as ts, caller};

    #[test]
    fn dates_must_be_ordered() {
        let mut new = ts::new_project("Pune", "forestry");
        new.start_date = "2026-02-01".into();
        new.end_date = "2026-01-01".into();
        assert!(matches!(
            new.validated(),
            Err(RegistryError::IncompleteData { field: "end_date", .. })
        ));
    }

    #[test]
    fn negative_area_is_incomplete() {
        let mut new = ts::new_project("Pune", "forestry");
        new.land_area = -1.0;
        assert!(matches!(
            new.validated(),
            Err(RegistryError::IncompleteData { field: "land_area", .. })
        ));
    }

    #[tokio::test]
    async fn creation_assigns_specialised_officer() {
        let pool = ts::pool().await;
        let authority = ts::authority(&pool, "a@x.org").await;
        ts::officer(&pool, "generalist@x.org", "Pune", &[]).await;
        let specialist = ts::officer(&pool, "forester@x.org", "Pune", &["forestry"]).await;

        let project = create(
            &pool,
            &caller(authority, Role::ProjectAuthority),
            ts::new_project("Pune", "forestry"),
        )
        .await
        .unwrap();

        assert_eq!(project.assigned_officer, Some(specialist));
        assert_eq!(project.state, ProjectState::Pending);
        assert_eq!(project.owner_id, authority);
        assert_eq!(project.documents, vec!["s3://docs/deed.pdf".to_string()]);
    }

    #[tokio::test]
    async fn creation_without_officers_leaves_project_unassigned() {
        let pool = ts::pool().await;
        let authority = ts::authority(&pool, "a@x.org").await;

        let project = create(
            &pool,
            &caller(authority, Role::ProjectAuthority),
            ts::new_project("Pune", "forestry"),
        )
        .await
        .unwrap();

        assert_eq!(project.assigned_officer, None);
        assert_eq!(project.state, ProjectState::Pending);
    }

    #[tokio::test]
    async fn officers_cannot_submit_projects() {
        let pool = ts::pool().await;
        let officer = ts::officer(&pool, "o@x.org", "Pune", &[]).await;
        let err = create(
            &pool,
            &caller(officer, Role::Officer),
            ts::new_project("Pune", "forestry"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn list_is_scoped_by_role() {
        let pool = ts::pool().await;
        let admin = ts::admin(&pool, "root@x.org").await;
        let a1 = ts::authority(&pool, "a1@x.org").await;
        let a2 = ts::authority(&pool, "a2@x.org").await;
        let o1 = ts::officer(&pool, "o1@x.org", "Pune", &[]).await;
        let o2 = ts::officer(&pool, "o2@x.org", "Delhi", &[]).await;

        let p1 = ts::unassigned_project(&pool, a1, "Pune", "forestry").await;
        let p2 = ts::unassigned_project(&pool, a2, "Delhi", "solar").await;
        let p3 = ts::unassigned_project(&pool, a2, "Delhi", "solar").await;
        ts::assign(&pool, p1, o1).await;
        ts::assign(&pool, p2, o2).await;

        let limits = PageLimits { default_size: 10, max_size: 10 };
        let ids = |page: Page<Project>| page.items.iter().map(|p| p.id).collect::<Vec<_>>();
        let req = PageRequest::default();

        let all = list(&pool, &caller(admin, Role::Admin), &req, limits).await.unwrap();
        assert_eq!(ids(all), vec![p1, p2, p3]);

        let owned = list(&pool, &caller(a2, Role::ProjectAuthority), &req, limits).await.unwrap();
        assert_eq!(ids(owned), vec![p2, p3]);

        let officer_view = list(&pool, &caller(o1, Role::Officer), &req, limits).await.unwrap();
        assert_eq!(ids(officer_view), vec![p1, p3]);

        let err = get(&pool, &caller(o1, Role::Officer), p2).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_pages_through_cursor() {
        let pool = ts::pool().await;
        let a = ts::authority(&pool, "a@x.org").await;
        for _ in 0..3 {
            ts::unassigned_project(&pool, a, "Pune", "forestry").await;
        }
        let me = caller(a, Role::ProjectAuthority);
        let limits = PageLimits { default_size: 2, max_size: 10 };

        let first = list(&pool, &me, &PageRequest::default(), limits).await.unwrap();
        assert_eq!(first.count, 2);
        let next = PageRequest { cursor: first.next_cursor.clone(), limit: None };
        let second = list(&pool, &me, &next, limits).await.unwrap();
        assert_eq!(second.count, 1);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn inconsistent_stored_row_reads_as_store_fault() {
        let pool = ts::pool().await;
        let a = ts::authority(&pool, "a@x.org").await;
        let p = ts::unassigned_project(&pool, a, "Pune", "forestry").await;
        sqlx::query("UPDATE projects SET verification_status = 'verified' WHERE id = ?1")
            .bind(p)
            .execute(&pool)
            .await
            .unwrap();

        let err = get(&pool, &caller(a, Role::ProjectAuthority), p)
            .await
            .unwrap_err();
        assert!(err.is_dependency_failure(), "{err}");
        assert!(!matches!(err, RegistryError::IncompleteData { .. }));
    }

    #[tokio::test]
    async fn oversized_cursor_is_rejected_not_wrapped() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let pool = ts::pool().await;
        let a = ts::authority(&pool, "a@x.org").await;
        ts::unassigned_project(&pool, a, "Pune", "forestry").await;
        let me = caller(a, Role::ProjectAuthority);
        let limits = PageLimits { default_size: 1, max_size: 10 };

        let huge = PageRequest {
            cursor: Some(URL_SAFE_NO_PAD.encode(u64::MAX.to_string())),
            limit: Some(1),
        };
        let err = list(&pool, &me, &huge, limits).await.unwrap_err();
        assert!(matches!(err, RegistryError::IncompleteData { field: "cursor", .. }));

        let far = PageRequest {
            cursor: Some(crate::pagination::encode_cursor(i64::MAX)),
            limit: Some(1),
        };
        let page = list(&pool, &me, &far, limits).await.unwrap();
        assert_eq!(page.count, 0);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn owner_edits_only_while_unassigned() {
        let pool = ts::pool().await;
        let admin = ts::admin(&pool, "root@x.org").await;
        let a = ts::authority(&pool, "a@x.org").await;
        let o = ts::officer(&pool, "o@x.org", "Pune", &[]).await;
        let p = ts::unassigned_project(&pool, a, "Pune", "forestry").await;

        let renamed = update(
            &pool,
            &caller(a, Role::ProjectAuthority),
            p,
            ProjectUpdate { name: Some("Western Ghats".into()), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Western Ghats");

        ts::assign(&pool, p, o).await;
        let err = update(
            &pool,
            &caller(a, Role::ProjectAuthority),
            p,
            ProjectUpdate { estimated_credits: Some(10.0), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidState(StateViolation::AssignmentLocked)
        ));

        let by_admin = update(
            &pool,
            &caller(admin, Role::Admin),
            p,
            ProjectUpdate { estimated_credits: Some(10.0), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(by_admin.estimated_credits, 10.0);
    }

    #[tokio::test]
    async fn only_owner_or_admin_deletes() {
        let pool = ts::pool().await;
        let a = ts::authority(&pool, "a@x.org").await;
        let other = ts::authority(&pool, "b@x.org").await;
        let p = ts::unassigned_project(&pool, a, "Pune", "forestry").await;

        let err = delete(&pool, &caller(other, Role::ProjectAuthority), p)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized(_)));

        delete(&pool, &caller(a, Role::ProjectAuthority), p).await.unwrap();
        assert!(db::projects::find(&pool, p).await.unwrap().is_none());
    }
}
