//! Rollup HTTP server protocol
//!
//! The dapp drives the machine by calling `POST /finish` with the status of
//! the previous request. The server answers with the next request (200) or
//! with 202 when nothing is pending. Outputs are posted to `/voucher`,
//! `/notice` and `/report` while a request is being handled.

use crate::error::{DappError, Result};
use crate::handlers::Dapp;
use alloy_primitives::Address;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub msg_sender: Address,
    #[serde(default)]
    pub epoch_index: u64,
    #[serde(default)]
    pub input_index: u64,
    #[serde(default)]
    pub block_number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvanceData {
    pub metadata: Metadata,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectData {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request_type", content = "data", rename_all = "snake_case")]
pub enum RollupRequest {
    AdvanceState(AdvanceData),
    InspectState(InspectData),
}

/// Something the dapp wants the rollup server to record.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Voucher { destination: Address, payload: String },
    Notice { payload: String },
    Report { payload: String },
}

impl Output {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Output::Voucher { .. } => "/voucher",
            Output::Notice { .. } => "/notice",
            Output::Report { .. } => "/report",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            Output::Voucher { destination, payload } => json!({
                "destination": destination.to_checksum(None),
                "payload": payload,
            }),
            Output::Notice { payload } | Output::Report { payload } => json!({ "payload": payload }),
        }
    }
}

/// Result of handling one request: the status for the next `/finish` and
/// the outputs to post before that.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub outputs: Vec<Output>,
}

impl Outcome {
    pub fn accept(outputs: Vec<Output>) -> Self {
        Self { status: Status::Accept, outputs }
    }

    pub fn reject(outputs: Vec<Output>) -> Self {
        Self { status: Status::Reject, outputs }
    }
}

pub struct RollupClient {
    http: reqwest::Client,
    base_url: String,
}

impl RollupClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Report `status` and fetch the next request, if any.
    pub async fn finish(&self, status: Status) -> Result<Option<RollupRequest>> {
        let url = format!("{}/finish", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "status": status }))
            .send()
            .await
            .map_err(|e| DappError::RollupError(e.to_string()))?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(None),
            StatusCode::OK => {
                let request = response
                    .json::<RollupRequest>()
                    .await
                    .map_err(|e| DappError::RollupError(format!("bad request body: {}", e)))?;
                Ok(Some(request))
            }
            other => Err(DappError::RollupError(format!("/finish returned {}", other))),
        }
    }

    pub async fn emit(&self, output: &Output) -> Result<()> {
        let url = format!("{}{}", self.base_url, output.endpoint());
        let response = self
            .http
            .post(&url)
            .json(&output.body())
            .send()
            .await
            .map_err(|e| DappError::RollupError(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            let text = response.text().await.unwrap_or_default();
            return Err(DappError::RollupError(format!(
                "POST {} failed with {}: {}",
                url, status, text
            )));
        }
        debug!(url = %url, status = %status, "output posted");
        Ok(())
    }
}

/// The `/finish` loop of the dapp.
pub struct RollupLoop {
    client: RollupClient,
    dapp: Dapp,
    status: Status,
    idle_backoff: Duration,
}

impl RollupLoop {
    pub fn new(client: RollupClient, dapp: Dapp, idle_backoff: Duration) -> Self {
        Self {
            client,
            dapp,
            status: Status::Accept,
            idle_backoff,
        }
    }

    pub fn dapp(&self) -> &Dapp {
        &self.dapp
    }

    /// Status that the next `/finish` call will report.
    pub fn status(&self) -> Status {
        self.status
    }

    /// One `/finish` round trip. Returns whether a request was handled.
    pub async fn step(&mut self) -> Result<bool> {
        let request = match self.client.finish(self.status).await? {
            Some(request) => request,
            None => return Ok(false),
        };

        let outcome = self.dapp.handle(&request);
        for output in &outcome.outputs {
            if let Err(e) = self.client.emit(output).await {
                warn!(error = %e, "failed to post output");
            }
        }
        self.status = outcome.status;
        Ok(true)
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(url = %self.client.base_url(), "starting rollup loop");
        loop {
            match self.step().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("No pending rollup request, trying again");
                    if !self.idle_backoff.is_zero() {
                        tokio::time::sleep(self.idle_backoff).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "rollup server unreachable");
                    tokio::time::sleep(self.idle_backoff.max(Duration::from_secs(1))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_request_parses() {
        let body = r#"{
            "request_type": "advance_state",
            "data": {
                "metadata": {
                    "msg_sender": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
                    "epoch_index": 0,
                    "input_index": 1,
                    "block_number": 30334,
                    "timestamp": 1722152540
                },
                "payload": "0xdeadbeef"
            }
        }"#;
        let request: RollupRequest = serde_json::from_str(body).unwrap();
        match request {
            RollupRequest::AdvanceState(data) => {
                assert_eq!(data.metadata.timestamp, 1722152540);
                assert_eq!(data.payload, "0xdeadbeef");
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_inspect_request_parses() {
        let request: RollupRequest =
            serde_json::from_str(r#"{"request_type":"inspect_state","data":{"payload":"0x7b7d"}}"#).unwrap();
        assert_eq!(
            request,
            RollupRequest::InspectState(InspectData { payload: "0x7b7d".to_string() })
        );
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Reject).unwrap(), "\"reject\"");
    }

    #[test]
    fn test_output_routing() {
        let voucher = Output::Voucher {
            destination: Address::repeat_byte(0x11),
            payload: "0x01".to_string(),
        };
        assert_eq!(voucher.endpoint(), "/voucher");
        assert_eq!(voucher.body()["payload"], "0x01");
        assert_eq!(Output::Report { payload: "0x".to_string() }.endpoint(), "/report");
        assert_eq!(Output::Notice { payload: "0x".to_string() }.endpoint(), "/notice");
    }
}
