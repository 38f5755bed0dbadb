//! Inspect queries against the rollup node

use crate::amount::{self, Amount};
use crate::error::{DappError, Result};
use crate::handlers::Report;
use alloy_primitives::Address;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct InspectReport {
    payload: String,
}

#[derive(Deserialize)]
struct InspectResponse {
    #[serde(default)]
    reports: Vec<InspectReport>,
}

pub struct InspectClient {
    http: reqwest::Client,
    url: String,
}

impl InspectClient {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            url: url.to_string(),
        })
    }

    /// Post `query` and decode the first report the dapp produced.
    pub async fn query(&self, query: &Value) -> Result<Report> {
        let response = self.http.post(&self.url).json(query).send().await?;
        if !response.status().is_success() {
            return Err(DappError::RpcError(format!("HTTP error! status: {}", response.status())));
        }

        let body: InspectResponse = response.json().await?;
        let first = body
            .reports
            .first()
            .ok_or_else(|| DappError::RpcError("inspect returned no reports".to_string()))?;
        Report::from_hex(&first.payload)
    }

    async fn message(&self, query: &Value) -> Result<String> {
        let report = self.query(query).await?;
        if report.error {
            return Err(DappError::RollupError(report.message));
        }
        Ok(report.message)
    }

    pub async fn balance(&self, wallet: Address, token: Address, timestamp: u64) -> Result<Amount> {
        let message = self
            .message(&json!({
                "data": "balance",
                "token_address": token,
                "wallet_address": wallet,
                "timestamp": timestamp,
            }))
            .await?;
        amount::parse_amount(&message)
    }

    pub async fn future_balance(&self, wallet: Address, token: Address) -> Result<Amount> {
        let message = self
            .message(&json!({
                "data": "future_balance",
                "token_address": token,
                "wallet_address": wallet,
            }))
            .await?;
        amount::parse_amount(&message)
    }
}
