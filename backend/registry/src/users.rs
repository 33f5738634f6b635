//! Admin-side user provisioning and the bootstrap admin.

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::auth::{self, Caller};
use crate::db;
use crate::errors::{RegistryError, Result};
use crate::models::{Role, User};

/// A user as submitted for provisioning.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    /// Externally issued bearer credential to register for the new user.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl NewUser {
    /// Trim and check fields; officer-only fields are dropped for other roles.
    pub fn validated(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        if self.name.is_empty() {
            return Err(RegistryError::incomplete("name", "must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(RegistryError::incomplete("email", "is not an email address"));
        }

        if self.role == Role::Officer {
            let jurisdiction = self
                .jurisdiction
                .as_deref()
                .map(str::trim)
                .filter(|j| !j.is_empty())
                .ok_or_else(|| {
                    RegistryError::incomplete("jurisdiction", "is required for officers")
                })?;
            self.jurisdiction = Some(jurisdiction.to_string());
            self.specializations = self
                .specializations
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        } else {
            self.jurisdiction = None;
            self.specializations.clear();
        }

        if matches!(self.access_token.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(RegistryError::incomplete("access_token", "must not be blank"));
        }
        Ok(self)
    }
}

/// Admin provisions a user, optionally registering a bearer credential.
pub async fn provision(pool: &SqlitePool, caller: &Caller, new: NewUser) -> Result<User> {
    auth::require(caller, &[Role::Admin])?;
    let user = create(pool, new.validated()?).await?;
    info!(
        "Admin {} provisioned {} user {}",
        caller.user_id,
        user.role.as_str(),
        user.id
    );
    Ok(user)
}

async fn create(pool: &SqlitePool, new: NewUser) -> Result<User> {
    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;
    let id = db::users::insert(&mut *tx, &new, now).await?;
    if let Some(token) = new.access_token.as_deref() {
        db::users::insert_token(&mut *tx, id, &auth::hash_token(token)).await?;
    }
    let user = db::users::get(&mut *tx, id).await?;
    tx.commit().await?;
    Ok(user)
}

/// Create the first admin when the user table is empty. Returns `None` if
/// users already exist.
pub async fn bootstrap_admin(pool: &SqlitePool, email: &str, token: &str) -> Result<Option<User>> {
    if db::users::count(pool).await? > 0 {
        return Ok(None);
    }
    let admin = NewUser {
        name: "Administrator".to_string(),
        email: email.to_string(),
        role: Role::Admin,
        jurisdiction: None,
        specializations: Vec::new(),
        access_token: Some(token.to_string()),
    }
    .validated()?;
    let user = create(pool, admin).await?;
    info!("Bootstrapped admin user {} <{}>", user.id, user.email);
    Ok(Some(user))
}

/// The caller's own user record.
pub async fn me(pool: &SqlitePool, caller: &Caller) -> Result<User> {
    db::users::get(pool, caller.user_id).await
}
