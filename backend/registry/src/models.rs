//! Domain records shared by the workflow modules, the database layer and the API.
//!
//! Enum-valued columns are stored as short snake_case strings; the `as_str` /
//! `parse` pairs below are the only place that mapping lives.

use serde::{Deserialize, Serialize};

use crate::errors::{RegistryError, Result};
use crate::lifecycle::ProjectState;

pub type UserId = i64;
pub type ProjectId = i64;

/// The three mutually exclusive user roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Officer,
    ProjectAuthority,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Officer, Role::ProjectAuthority];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Officer => "officer",
            Self::ProjectAuthority => "project_authority",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "officer" => Ok(Self::Officer),
            "project_authority" => Ok(Self::ProjectAuthority),
            other => Err(RegistryError::corrupt_column(
                "role",
                format!("unknown role {other:?}"),
            )),
        }
    }
}

/// A registered user. Officer-only fields are `None` / empty for other roles.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub jurisdiction: Option<String>,
    pub specializations: Vec<String>,
    pub created_at: i64,
}

/// Where a project is located; the resolver matches on `city` then `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
}

/// A carbon-credit project.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub start_date: String,
    pub end_date: String,
    pub location: Location,
    pub land_area: f64,
    pub land_area_unit: String,
    pub estimated_credits: f64,
    pub documents: Vec<String>,
    pub images: Vec<String>,
    pub owner_id: UserId,
    pub assigned_officer: Option<UserId>,
    #[serde(flatten)]
    pub state: ProjectState,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An officer's approve/reject call on a field verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(RegistryError::corrupt_column(
                "decision",
                format!("unknown decision {other:?}"),
            )),
        }
    }
}

/// Validated field measurements carried by a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurements {
    pub measured_area: f64,
    pub plot_count: i64,
    pub sampling_flights: i64,
    pub measured_biomass: f64,
    pub uncertainty_pct: f64,
    pub recommended_credits: f64,
}

/// A recorded verification report. Immutable once stored.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub id: i64,
    pub project_id: ProjectId,
    pub officer_id: UserId,
    #[serde(flatten)]
    pub measurements: Measurements,
    pub decision: Decision,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Distributed,
}

impl DistributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Distributed => "distributed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "distributed" => Ok(Self::Distributed),
            other => Err(RegistryError::corrupt_column(
                "status",
                format!("unknown distribution status {other:?}"),
            )),
        }
    }
}

/// The split of a verified project's credits between its officer and authority.
#[derive(Debug, Clone, Serialize)]
pub struct CreditDistribution {
    pub id: i64,
    pub project_id: ProjectId,
    pub officer_id: UserId,
    pub authority_id: UserId,
    pub total_credits: f64,
    pub officer_share_pct: f64,
    pub authority_share_pct: f64,
    pub status: DistributionStatus,
    pub created_at: i64,
    pub distributed_at: Option<i64>,
}
