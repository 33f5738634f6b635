//! User and access-token queries.

use sqlx::{SqliteExecutor, SqlitePool};

use crate::db::is_unique_violation;
use crate::errors::{ConflictKind, RegistryError, Result};
use crate::models::{Role, User, UserId};
use crate::users::NewUser;

const USER_COLUMNS: &str =
    "users.id, users.name, users.email, users.role, users.jurisdiction, \
     users.specializations, users.created_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    jurisdiction: Option<String>,
    specializations: String,
    created_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = RegistryError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role: Role::parse(&row.role)?,
            jurisdiction: row.jurisdiction,
            specializations: serde_json::from_str(&row.specializations)?,
            created_at: row.created_at,
        })
    }
}

pub async fn insert<'e>(exec: impl SqliteExecutor<'e>, user: &NewUser, now: i64) -> Result<UserId> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, role, jurisdiction, specializations, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(user.role.as_str())
    .bind(&user.jurisdiction)
    .bind(serde_json::to_string(&user.specializations)?)
    .bind(now)
    .execute(exec)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(RegistryError::Conflict(ConflictKind::EmailTaken)),
        Err(e) => Err(e.into()),
    }
}

pub async fn insert_token<'e>(
    exec: impl SqliteExecutor<'e>,
    user_id: UserId,
    token_hash: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO access_tokens (token_hash, user_id) VALUES (?1, ?2)")
        .bind(token_hash)
        .bind(user_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn get<'e>(exec: impl SqliteExecutor<'e>, id: UserId) -> Result<User> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;
    row.map(User::try_from)
        .transpose()?
        .ok_or_else(|| RegistryError::NotFound(format!("user {id}")))
}

pub async fn find_by_token_hash(pool: &SqlitePool, token_hash: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM access_tokens \
         JOIN users ON users.id = access_tokens.user_id \
         WHERE access_tokens.token_hash = ?1"
    ))
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;
    row.map(User::try_from).transpose()
}

/// All officers in registration order.
pub async fn list_officers<'e>(exec: impl SqliteExecutor<'e>) -> Result<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE role = ?1 ORDER BY id ASC"
    ))
    .bind(Role::Officer.as_str())
    .fetch_all(exec)
    .await?;
    rows.into_iter().map(User::try_from).collect()
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// `(role, count)` for roles that have at least one user.
pub async fn count_by_role(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    Ok(
        sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
            .fetch_all(pool)
            .await?,
    )
}
