//! Token ledger client — reads the credit token's minted / burned supply.
//!
//! The ledger is an opaque collaborator: one JSON-RPC `getTokenSupply` call
//! that either succeeds or fails. There is no retry here; a failure surfaces
//! to the caller as a dependency error. Without a configured endpoint the
//! supply is the local view (everything distributed counts as minted).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::debug;

use crate::config::Config;
use crate::db;
use crate::errors::{RegistryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Supply {
    pub minted: f64,
    pub burned: f64,
}

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Supply>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Turn a decoded JSON-RPC body into a supply figure.
pub fn supply_from_response(body: RpcResponse) -> Result<Supply> {
    if let Some(err) = body.error {
        return Err(RegistryError::Ledger(format!(
            "RPC error {}: {}",
            err.code, err.message
        )));
    }
    let supply = body
        .result
        .ok_or_else(|| RegistryError::Ledger("Empty result from getTokenSupply".to_string()))?;
    if !(supply.minted.is_finite() && supply.burned.is_finite()) {
        return Err(RegistryError::Ledger("Non-numeric supply figures".to_string()));
    }
    Ok(supply)
}

#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: Client,
    rpc_url: Option<String>,
    token_id: String,
}

impl LedgerClient {
    pub fn new(client: Client, rpc_url: Option<String>, token_id: impl Into<String>) -> Self {
        LedgerClient {
            client,
            rpc_url,
            token_id: token_id.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.ledger_timeout_secs))
            .build()?;
        Ok(Self::new(
            client,
            config.ledger_rpc_url.clone(),
            config.ledger_token_id.clone(),
        ))
    }

    /// A client with no remote endpoint.
    pub fn local() -> Self {
        Self::new(Client::new(), None, "carbon-credit")
    }

    pub async fn supply(&self, pool: &SqlitePool) -> Result<Supply> {
        match self.rpc_url.as_deref() {
            Some(url) => self.fetch_supply(url).await,
            None => Ok(Supply {
                minted: db::distributions::sum_distributed_totals(pool).await?,
                burned: 0.0,
            }),
        }
    }

    async fn fetch_supply(&self, rpc_url: &str) -> Result<Supply> {
        let body: RpcResponse = self
            .client
            .post(rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "getTokenSupply",
                "params": { "tokenId": self.token_id },
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let supply = supply_from_response(body)?;
        debug!(
            "Ledger supply for {}: minted={} burned={}",
            self.token_id, supply.minted, supply.burned
        );
        Ok(supply)
    }
}
