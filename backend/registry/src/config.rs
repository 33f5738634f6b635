//! Application configuration loaded from environment variables.

use crate::credits::{self, SharePolicy};
use crate::errors::{RegistryError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// JSON-RPC endpoint of the token ledger; local supply view when unset
    pub ledger_rpc_url: Option<String>,
    /// Token identifier passed to the ledger's `getTokenSupply`
    pub ledger_token_id: String,
    /// Request timeout for ledger calls
    pub ledger_timeout_secs: u64,
    /// Default officer/authority split applied to new distributions
    pub share_policy: SharePolicy,
    /// Page size used when a list request carries no `limit`
    pub default_page_size: u32,
    /// Upper bound for `limit` on list requests
    pub max_page_size: u32,
    /// Email of the admin provisioned on an empty user table
    pub bootstrap_admin_email: Option<String>,
    /// Bearer credential registered for the bootstrap admin
    pub bootstrap_admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let share_policy = SharePolicy {
            officer_pct: parse_or("OFFICER_SHARE_PCT", "10")?,
            authority_pct: parse_or("AUTHORITY_SHARE_PCT", "80")?,
        };
        credits::compute_shares(0.0, share_policy.officer_pct, share_policy.authority_pct)
            .map_err(|e| RegistryError::Config(format!("Invalid share policy: {e}")))?;

        let default_page_size: u32 = parse_or("DEFAULT_PAGE_SIZE", "20")?;
        let max_page_size: u32 = parse_or("MAX_PAGE_SIZE", "100")?;
        if default_page_size == 0 || default_page_size > max_page_size {
            return Err(RegistryError::Config(
                "DEFAULT_PAGE_SIZE must be within [1, MAX_PAGE_SIZE]".to_string(),
            ));
        }

        let bootstrap_admin_email = env_var("BOOTSTRAP_ADMIN_EMAIL").ok();
        let bootstrap_admin_token = env_var("BOOTSTRAP_ADMIN_TOKEN").ok();
        if bootstrap_admin_email.is_some() != bootstrap_admin_token.is_some() {
            return Err(RegistryError::Config(
                "BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_TOKEN must be set together".to_string(),
            ));
        }

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./registry.db".to_string()),
            api_port: parse_or("API_PORT", "3001")?,
            ledger_rpc_url: env_var("LEDGER_RPC_URL").ok().filter(|u| !u.is_empty()),
            ledger_token_id: env_var("LEDGER_TOKEN_ID")
                .unwrap_or_else(|_| "carbon-credit".to_string()),
            ledger_timeout_secs: parse_or("LEDGER_TIMEOUT_SECS", "30")?,
            share_policy,
            default_page_size,
            max_page_size,
            bootstrap_admin_email,
            bootstrap_admin_token,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| RegistryError::Config(format!("Missing env var: {key}")))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| RegistryError::Config(format!("Invalid {key}")))
}
