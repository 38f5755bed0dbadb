//! EVM JSON-RPC access to a local dev node
//!
//! Transactions are sent with `eth_sendTransaction` from accounts the node
//! keeps unlocked (anvil/hardhat), so nothing is signed locally. Standard
//! calls go through an alloy provider. Only the dev-node clock controls are
//! raw requests.

use crate::error::{DappError, Result};
use alloy::eips::BlockNumberOrTag;
use alloy::network::{Ethereum, ReceiptResponse};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{TransactionInput, TransactionRequest as EthTransactionRequest};
use alloy_primitives::{Address, Bytes, B256};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub data: Bytes,
}

impl TransactionRequest {
    pub fn call(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: Some(to),
            data: data.into(),
        }
    }

    pub fn create(from: Address, init_code: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: None,
            data: init_code.into(),
        }
    }

    /// The provider-side request. Calldata goes out as both `input` and
    /// `data`, which keeps hardhat and anvil happy.
    fn to_eth(&self) -> EthTransactionRequest {
        let request = EthTransactionRequest::default()
            .from(self.from)
            .input(TransactionInput::both(self.data.clone()));
        match self.to {
            Some(to) => request.to(to),
            None => request,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub status: bool,
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
}

impl TransactionReceipt {
    fn from_rpc<R: ReceiptResponse>(receipt: &R) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash(),
            status: receipt.status(),
            contract_address: receipt.contract_address(),
            block_number: receipt.block_number(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status
    }
}

pub struct RpcClient {
    provider: RootProvider<Ethereum>,
    receipt_attempts: u32,
    receipt_interval: Duration,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let url = url
            .parse::<reqwest::Url>()
            .map_err(|e| DappError::RpcError(format!("bad RPC url {}: {}", url, e)))?;
        Ok(Self {
            provider: RootProvider::<Ethereum>::new_http(url),
            receipt_attempts: 60,
            receipt_interval: Duration::from_millis(500),
        })
    }

    pub fn with_receipt_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.receipt_attempts = attempts.max(1);
        self.receipt_interval = interval;
        self
    }

    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256> {
        let pending = self.provider.send_transaction(tx.to_eth()).await?;
        let hash = *pending.tx_hash();
        debug!(hash = %hash, from = %tx.from, "transaction sent");
        Ok(hash)
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.as_ref().map(TransactionReceipt::from_rpc))
    }

    /// Poll until the transaction is mined. A reverted receipt is an error.
    pub async fn wait_for_receipt(&self, hash: B256) -> Result<TransactionReceipt> {
        for _ in 0..self.receipt_attempts {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                if !receipt.succeeded() {
                    return Err(DappError::TransactionReverted(hash.to_string()));
                }
                return Ok(receipt);
            }
            tokio::time::sleep(self.receipt_interval).await;
        }
        Err(DappError::RpcError(format!("no receipt for {}", hash)))
    }

    /// Send and wait for the receipt.
    pub async fn transact(&self, tx: &TransactionRequest) -> Result<TransactionReceipt> {
        let hash = self.send_transaction(tx).await?;
        self.wait_for_receipt(hash).await
    }

    /// Deploy `bytecode` with ABI-encoded constructor arguments appended.
    pub async fn deploy(&self, from: Address, bytecode: &Bytes, constructor_args: &[u8]) -> Result<Address> {
        let mut init_code = bytecode.to_vec();
        init_code.extend_from_slice(constructor_args);

        let receipt = self.transact(&TransactionRequest::create(from, init_code)).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            DappError::RpcError(format!("receipt {} has no contract address", receipt.transaction_hash))
        })?;
        info!(address = %address, "contract deployed");
        Ok(address)
    }

    pub async fn call(&self, to: Address, data: impl Into<Bytes>) -> Result<Bytes> {
        let request = EthTransactionRequest::default()
            .to(to)
            .input(TransactionInput::both(data.into()));
        Ok(self.provider.call(request).await?)
    }

    pub async fn latest_block_timestamp(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| DappError::RpcError("no latest block".to_string()))?;
        Ok(block.header.timestamp)
    }

    /// Move the dev node's clock forward and mine a block at the new time.
    pub async fn increase_time(&self, seconds: u64) -> Result<()> {
        self.dev_request("evm_increaseTime", vec![Value::from(seconds)]).await?;
        self.dev_request("evm_mine", Vec::new()).await?;
        Ok(())
    }

    async fn dev_request(&self, method: &'static str, params: Vec<Value>) -> Result<Value> {
        self.provider
            .raw_request::<_, Value>(method.into(), params)
            .await
            .map_err(|e| DappError::RpcError(format!("{}: {}", method, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_has_no_destination() {
        let tx = TransactionRequest::create(Address::repeat_byte(0x01), vec![0x60, 0x80]);
        let value = serde_json::to_value(tx.to_eth()).unwrap();
        assert!(value.get("to").is_none());
        assert_eq!(value["input"], "0x6080");
        assert_eq!(value["data"], "0x6080");
    }

    #[test]
    fn test_call_request_targets_contract() {
        let to = Address::repeat_byte(0x02);
        let tx = TransactionRequest::call(Address::repeat_byte(0x01), to, vec![0xab]);
        let value = serde_json::to_value(tx.to_eth()).unwrap();
        assert_eq!(value["to"], json!(to));
        assert_eq!(value["from"], json!(Address::repeat_byte(0x01)));
    }

    #[test]
    fn test_receipt_status() {
        let rpc: alloy::rpc::types::TransactionReceipt = serde_json::from_value(json!({
            "type": "0x2",
            "status": "0x0",
            "cumulativeGasUsed": "0x5208",
            "logs": [],
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "transactionHash": B256::repeat_byte(0x01),
            "transactionIndex": "0x0",
            "blockHash": B256::repeat_byte(0x02),
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "from": Address::repeat_byte(0x03),
            "to": Address::repeat_byte(0x04),
            "contractAddress": null,
        }))
        .unwrap();
        let receipt = TransactionReceipt::from_rpc(&rpc);
        assert!(!receipt.succeeded());
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.transaction_hash, B256::repeat_byte(0x01));
    }
}
