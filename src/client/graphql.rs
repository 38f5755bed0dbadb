//! Voucher queries against the rollup node's GraphQL endpoint

use crate::client::contracts::{ICartesiDApp, OutputValidityProof, Proof};
use crate::error::{DappError, Result};
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolCall;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

pub const VOUCHERS_QUERY: &str = r#"
query GetVouchers {
  vouchers {
    edges {
      node {
        input {
          msgSender
          payload
          index
        }
        payload
        proof {
          validity {
            inputIndexWithinEpoch
            outputIndexWithinInput
            outputHashesRootHash
            vouchersEpochRootHash
            noticesEpochRootHash
            machineStateHash
            outputHashInOutputHashesSiblings
            outputHashesInEpochSiblings
          }
          context
        }
        destination
      }
    }
  }
}
"#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherInput {
    pub msg_sender: Address,
    pub payload: Bytes,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validity {
    pub input_index_within_epoch: u64,
    pub output_index_within_input: u64,
    pub output_hashes_root_hash: B256,
    pub vouchers_epoch_root_hash: B256,
    pub notices_epoch_root_hash: B256,
    pub machine_state_hash: B256,
    pub output_hash_in_output_hashes_siblings: Vec<B256>,
    pub output_hashes_in_epoch_siblings: Vec<B256>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoucherProof {
    pub validity: Validity,
    pub context: Bytes,
}

impl VoucherProof {
    pub fn to_sol(&self) -> Proof {
        let v = &self.validity;
        Proof {
            validity: OutputValidityProof {
                inputIndexWithinEpoch: v.input_index_within_epoch,
                outputIndexWithinInput: v.output_index_within_input,
                outputHashesRootHash: v.output_hashes_root_hash,
                vouchersEpochRootHash: v.vouchers_epoch_root_hash,
                noticesEpochRootHash: v.notices_epoch_root_hash,
                machineStateHash: v.machine_state_hash,
                outputHashInOutputHashesSiblings: v.output_hash_in_output_hashes_siblings.clone(),
                outputHashesInEpochSiblings: v.output_hashes_in_epoch_siblings.clone(),
            },
            context: self.context.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Voucher {
    pub input: VoucherInput,
    pub payload: Bytes,
    /// Absent until the epoch holding the voucher is closed.
    #[serde(default)]
    pub proof: Option<VoucherProof>,
    pub destination: Address,
}

impl Voucher {
    /// Calldata for `executeVoucher` on the dapp contract.
    pub fn execute_call(&self) -> Result<Vec<u8>> {
        let proof = self.proof.as_ref().ok_or_else(|| {
            DappError::GraphQlError(format!("voucher of input {} has no proof yet", self.input.index))
        })?;
        let call = ICartesiDApp::executeVoucherCall {
            destination: self.destination,
            payload: self.payload.clone(),
            proof: proof.to_sol(),
        };
        Ok(call.abi_encode())
    }
}

#[derive(Deserialize)]
struct Edge {
    node: Voucher,
}

#[derive(Deserialize)]
struct EdgeList {
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct VouchersData {
    vouchers: EdgeList,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<VouchersData>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

pub struct GraphQlClient {
    http: reqwest::Client,
    url: String,
    poll_interval: Duration,
    max_attempts: u32,
}

impl GraphQlClient {
    /// `max_attempts == 0` makes [`wait_for_vouchers`](Self::wait_for_vouchers) poll forever.
    pub fn new(url: &str, poll_interval: Duration, max_attempts: u32) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            url: url.to_string(),
            poll_interval,
            max_attempts,
        })
    }

    pub async fn vouchers(&self) -> Result<Vec<Voucher>> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "query": VOUCHERS_QUERY }))
            .send()
            .await
            .map_err(|e| DappError::GraphQlError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DappError::GraphQlError(format!("HTTP error! status: {}", response.status())));
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| DappError::GraphQlError(e.to_string()))?;
        if let Some(first) = body.errors.first() {
            return Err(DappError::GraphQlError(first.message.clone()));
        }
        let data = body
            .data
            .ok_or_else(|| DappError::GraphQlError("response has no data".to_string()))?;

        Ok(data.vouchers.edges.into_iter().map(|edge| edge.node).collect())
    }

    /// Re-query at a fixed interval until at least one voucher exists.
    pub async fn wait_for_vouchers(&self) -> Result<Vec<Voucher>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let vouchers = self.vouchers().await?;
            if !vouchers.is_empty() {
                info!(count = vouchers.len(), attempt, "vouchers available");
                return Ok(vouchers);
            }
            if self.max_attempts != 0 && attempt >= self.max_attempts {
                return Err(DappError::GraphQlError(format!(
                    "no vouchers after {} attempts",
                    attempt
                )));
            }
            debug!(attempt, "no vouchers yet");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voucher_edge_decodes() {
        let body = json!({
            "data": { "vouchers": { "edges": [ { "node": {
                "input": { "msgSender": "0x59b22d57d4f067708ab0c00552767405926dc768", "payload": "0x01", "index": 2 },
                "payload": "0x1f5195b7",
                "proof": {
                    "validity": {
                        "inputIndexWithinEpoch": 2,
                        "outputIndexWithinInput": 0,
                        "outputHashesRootHash": B256::repeat_byte(0x01),
                        "vouchersEpochRootHash": B256::repeat_byte(0x02),
                        "noticesEpochRootHash": B256::repeat_byte(0x03),
                        "machineStateHash": B256::repeat_byte(0x04),
                        "outputHashInOutputHashesSiblings": [B256::repeat_byte(0x05)],
                        "outputHashesInEpochSiblings": []
                    },
                    "context": "0x"
                },
                "destination": "0x0000000000000000000000000000000000000001"
            } } ] } }
        });

        let response: GraphQlResponse = serde_json::from_value(body).unwrap();
        let voucher = &response.data.unwrap().vouchers.edges[0].node;
        assert_eq!(voucher.input.index, 2);

        let proof = voucher.proof.as_ref().unwrap().to_sol();
        assert_eq!(proof.validity.inputIndexWithinEpoch, 2);
        assert_eq!(proof.validity.machineStateHash, B256::repeat_byte(0x04));
        assert_eq!(proof.validity.outputHashInOutputHashesSiblings.len(), 1);

        let calldata = voucher.execute_call().unwrap();
        assert_eq!(&calldata[..4], ICartesiDApp::executeVoucherCall::SELECTOR.as_slice());
    }

    #[test]
    fn test_unproven_voucher_decodes() {
        let voucher: Voucher = serde_json::from_value(json!({
            "input": { "msgSender": "0x0000000000000000000000000000000000000002", "payload": "0x", "index": 0 },
            "payload": "0x",
            "proof": null,
            "destination": "0x0000000000000000000000000000000000000001"
        }))
        .unwrap();
        assert!(voucher.proof.is_none());
        assert!(matches!(voucher.execute_call(), Err(DappError::GraphQlError(_))));
    }
}
