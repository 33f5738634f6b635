//! Axum REST API handlers.
//!
//! Handlers only authenticate, extract and delegate; every rule lives in the
//! workflow modules.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::error;

use crate::assignment;
use crate::auth::{self, Caller};
use crate::credits::{self, CreditTotals, DistributionRequest, SharePolicy};
use crate::errors::RegistryError;
use crate::ledger::LedgerClient;
use crate::lifecycle;
use crate::models::{CreditDistribution, Project, ProjectId, User, VerificationReport};
use crate::pagination::{Page, PageLimits, PageRequest};
use crate::projects::{self, NewProject, ProjectUpdate};
use crate::reports::{self, ReportSubmission};
use crate::stats::{self, VerificationStats};
use crate::users::{self, NewUser};

pub struct ApiState {
    pub pool: SqlitePool,
    pub ledger: LedgerClient,
    pub share_policy: SharePolicy,
    pub page_limits: PageLimits,
}

type AppState = Arc<ApiState>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/me", get(me))
        .route("/users", post(create_user))
        .route("/users/stats", get(user_stats))
        .route("/projects", post(create_project).get(list_projects))
        .route(
            "/projects/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/projects/:id/assign", patch(assign_project).delete(unassign_project))
        .route("/projects/:id/start", post(start_verification))
        .route("/projects/:id/report", post(submit_report).get(get_report))
        .route("/projects/:id/distribution", post(create_distribution))
        .route("/verifications/stats", get(verification_stats))
        .route("/credits/stats", get(credit_stats))
        .route("/distributions", get(list_distributions))
        .route("/distributions/:id", get(get_distribution))
        .route("/distributions/:id/finalize", post(finalize_distribution))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Errors and authentication
// ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    /// No credential, or one that resolves to nobody.
    Unauthenticated,
    Registry(RegistryError),
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

pub fn status_for(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::Unauthorized(_) => StatusCode::FORBIDDEN,
        RegistryError::InvalidState(_) | RegistryError::Conflict(_) => StatusCode::CONFLICT,
        RegistryError::IncompleteData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: "missing or unknown bearer credential".to_string(),
                    kind: "unauthenticated",
                    field: None,
                },
            ),
            Self::Registry(e) if e.is_dependency_failure() => {
                error!("Request failed on a dependency: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "internal server error".to_string(),
                        kind: e.kind(),
                        field: None,
                    },
                )
            }
            Self::Registry(e) => {
                let field = match &e {
                    RegistryError::IncompleteData { field, .. } => Some(*field),
                    _ => None,
                };
                (
                    status_for(&e),
                    ErrorResponse {
                        error: e.to_string(),
                        kind: e.kind(),
                        field,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(ApiError::Unauthenticated)?;
        auth::resolve_bearer(&state.pool, token)
            .await?
            .ok_or(ApiError::Unauthenticated)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /me`
pub async fn me(State(state): State<AppState>, caller: Caller) -> ApiResult<User> {
    Ok(Json(users::me(&state.pool, &caller).await?))
}

/// `POST /users` (admin)
pub async fn create_user(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = users::provision(&state.pool, &caller, body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/stats` (admin)
pub async fn user_stats(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<BTreeMap<&'static str, i64>> {
    Ok(Json(stats::user_stats(&state.pool, &caller).await?))
}

/// `POST /projects` (authority / admin)
///
/// Creates the project and runs the officer resolver.
pub async fn create_project(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = projects::create(&state.pool, &caller, body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /projects`
pub async fn list_projects(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<PageRequest>,
) -> ApiResult<Page<Project>> {
    Ok(Json(
        projects::list(&state.pool, &caller, &page, state.page_limits).await?,
    ))
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
) -> ApiResult<Project> {
    Ok(Json(projects::get(&state.pool, &caller, id).await?))
}

/// `PATCH /projects/:id`
pub async fn update_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
    Json(body): Json<ProjectUpdate>,
) -> ApiResult<Project> {
    Ok(Json(projects::update(&state.pool, &caller, id, body).await?))
}

/// `DELETE /projects/:id`
pub async fn delete_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
) -> Result<StatusCode, ApiError> {
    projects::delete(&state.pool, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /projects/:id/assign` (officer)
pub async fn assign_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
) -> ApiResult<Project> {
    Ok(Json(assignment::self_assign(&state.pool, &caller, id).await?))
}

/// `DELETE /projects/:id/assign` (admin)
pub async fn unassign_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
) -> ApiResult<Project> {
    Ok(Json(
        assignment::clear_assignment(&state.pool, &caller, id).await?,
    ))
}

/// `POST /projects/:id/start` (assigned officer)
pub async fn start_verification(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
) -> ApiResult<Project> {
    Ok(Json(
        lifecycle::start_verification(&state.pool, &caller, id).await?,
    ))
}

/// `POST /projects/:id/report` (assigned officer)
pub async fn submit_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
    Json(body): Json<ReportSubmission>,
) -> Result<(StatusCode, Json<VerificationReport>), ApiError> {
    let report = reports::submit(&state.pool, &caller, id, body).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `GET /projects/:id/report`
pub async fn get_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
) -> ApiResult<VerificationReport> {
    Ok(Json(
        reports::get_for_project(&state.pool, &caller, id).await?,
    ))
}

/// `POST /projects/:id/distribution` (admin / assigned officer)
pub async fn create_distribution(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ProjectId>,
    body: Option<Json<DistributionRequest>>,
) -> Result<(StatusCode, Json<CreditDistribution>), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let distribution =
        credits::create_distribution(&state.pool, &caller, id, request, state.share_policy).await?;
    Ok((StatusCode::CREATED, Json(distribution)))
}

/// `GET /verifications/stats` (officer / admin)
pub async fn verification_stats(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<VerificationStats> {
    Ok(Json(stats::verification_stats(&state.pool, &caller).await?))
}

/// `GET /credits/stats`
pub async fn credit_stats(State(state): State<AppState>, caller: Caller) -> ApiResult<CreditTotals> {
    Ok(Json(
        credits::credit_stats(&state.pool, &state.ledger, &caller).await?,
    ))
}

/// `GET /distributions`
pub async fn list_distributions(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<PageRequest>,
) -> ApiResult<Page<CreditDistribution>> {
    Ok(Json(
        credits::list(&state.pool, &caller, &page, state.page_limits).await?,
    ))
}

/// `GET /distributions/:id`
pub async fn get_distribution(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<CreditDistribution> {
    Ok(Json(credits::get(&state.pool, &caller, id).await?))
}

/// `POST /distributions/:id/finalize` (admin / distribution officer)
pub async fn finalize_distribution(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> ApiResult<CreditDistribution> {
    Ok(Json(credits::finalize(&state.pool, &caller, id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::db;
    use crate::errors::{ConflictKind, StateViolation};
    use crate::test_support as ts;

    async fn serve(pool: SqlitePool) -> String {
        let state = Arc::new(ApiState {
            pool,
            ledger: LedgerClient::local(),
            share_policy: SharePolicy::default(),
            page_limits: PageLimits { default_size: 20, max_size: 100 },
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn issue_token(pool: &SqlitePool, user: i64, token: &str) {
        db::users::insert_token(pool, user, &auth::hash_token(token))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_credential_is_401_and_wrong_role_is_403() {
        let pool = ts::pool().await;
        let authority = ts::authority(&pool, "a@x.org").await;
        issue_token(&pool, authority, "a-token").await;
        let base = serve(pool).await;
        let http = reqwest::Client::new();

        let anonymous = http.get(format!("{base}/users/stats")).send().await.unwrap();
        assert_eq!(anonymous.status(), reqwest::StatusCode::UNAUTHORIZED);

        let unknown = http
            .get(format!("{base}/users/stats"))
            .bearer_auth("nobody")
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), reqwest::StatusCode::UNAUTHORIZED);

        let denied = http
            .get(format!("{base}/users/stats"))
            .bearer_auth("a-token")
            .send()
            .await
            .unwrap();
        assert_eq!(denied.status(), reqwest::StatusCode::FORBIDDEN);
        let body: Value = denied.json().await.unwrap();
        assert_eq!(body["kind"], "unauthorized");

        let health = http.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn distribution_without_body_uses_report_and_policy() {
        let pool = ts::pool().await;
        let admin = ts::admin(&pool, "root@x.org").await;
        issue_token(&pool, admin, "root-token").await;
        let (project, _) = ts::verified_project(&pool, 500.0).await;
        let base = serve(pool).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/projects/{project}/distribution"))
            .bearer_auth("root-token")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["total_credits"], 500.0);
        assert_eq!(body["officer_share_pct"], 10.0);
        assert_eq!(body["authority_share_pct"], 80.0);
        assert_eq!(body["status"], "pending");
    }

    #[tokio::test]
    async fn incomplete_report_names_the_field() {
        let pool = ts::pool().await;
        let (project, officer) = ts::project_in_verification(&pool).await;
        issue_token(&pool, officer, "o-token").await;
        let base = serve(pool).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/projects/{project}/report"))
            .bearer_auth("o-token")
            .json(&json!({
                "measured_area": 40.0,
                "sampling_flights": 1,
                "measured_biomass": 12.0,
                "uncertainty_pct": 5.0,
                "recommended_credits": 300.0,
                "decision": "approve"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["kind"], "incomplete_data");
        assert_eq!(body["field"], "plot_count");
    }

    #[test]
    fn taxonomy_maps_to_client_statuses() {
        assert_eq!(
            status_for(&RegistryError::Unauthorized("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&RegistryError::InvalidState(StateViolation::AlreadyStarted)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&RegistryError::Conflict(ConflictKind::AlreadyAssigned)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&RegistryError::incomplete("plot_count", "is missing")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&RegistryError::NotFound("project 1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RegistryError::Ledger("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthenticated_is_distinct_from_denied() {
        let denied = ApiError::from(RegistryError::Unauthorized("no".into())).into_response();
        let unknown = ApiError::Unauthenticated.into_response();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    }
}
