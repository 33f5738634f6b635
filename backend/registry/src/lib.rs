//! Carbon-credit project registry.
//!
//! Projects are submitted by project authorities, assigned to a verification
//! officer, field-verified, and finally have their credits split between the
//! officer and the authority:
//!
//! | Phase        | Module                                   |
//! |--------------|------------------------------------------|
//! | Access       | [`auth`] (role gate, ownership, scopes)  |
//! | Submission   | [`projects`], [`assignment`]             |
//! | Verification | [`lifecycle`], [`reports`]               |
//! | Distribution | [`credits`], [`ledger`]                  |
//! | Reporting    | [`stats`]                                |
//!
//! [`api`] exposes the operations over HTTP and [`db`] holds every query.

pub mod api;
pub mod assignment;
pub mod auth;
pub mod config;
pub mod credits;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod pagination;
pub mod projects;
pub mod reports;
pub mod stats;
pub mod users;

#[cfg(test)]
mod test_support;
