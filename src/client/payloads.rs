//! Input submission helpers
//!
//! Every dapp action is JSON wrapped by the InputBoxWrapper, which prefixes
//! the caller and the current allocator balances before forwarding it to the
//! InputBox.

use crate::action::Action;
use crate::amount::Amount;
use crate::client::contracts::{IERC20Mock, IInputBox, IInputBoxWrapper};
use crate::client::rpc::{RpcClient, TransactionReceipt, TransactionRequest};
use crate::codec;
use crate::error::Result;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use tracing::info;

/// Submits inputs for one account to one dapp.
pub struct InputSender<'a> {
    rpc: &'a RpcClient,
    from: Address,
    dapp: Address,
    input_box: Address,
    input_box_wrapper: Address,
}

impl<'a> InputSender<'a> {
    pub fn new(
        rpc: &'a RpcClient,
        from: Address,
        dapp: Address,
        input_box: Address,
        input_box_wrapper: Address,
    ) -> Self {
        Self {
            rpc,
            from,
            dapp,
            input_box,
            input_box_wrapper,
        }
    }

    pub fn account(&self) -> Address {
        self.from
    }

    /// Raw input straight into the InputBox, bypassing the wrapper.
    pub async fn input_box_add_input(&self, payload: Bytes) -> Result<TransactionReceipt> {
        let call = IInputBox::addInputCall {
            dapp: self.dapp,
            input: payload,
        };
        let receipt = self
            .rpc
            .transact(&TransactionRequest::call(self.from, self.input_box, call.abi_encode()))
            .await?;
        info!(input_box = %self.input_box, "Input added");
        Ok(receipt)
    }

    pub async fn input_box_wrapper_add_input(&self, payload: Bytes) -> Result<TransactionReceipt> {
        let call = IInputBoxWrapper::addInputCall {
            dapp: self.dapp,
            payload,
        };
        let receipt = self
            .rpc
            .transact(&TransactionRequest::call(self.from, self.input_box_wrapper, call.abi_encode()))
            .await?;
        info!(input_box_wrapper = %self.input_box_wrapper, "Input added");
        Ok(receipt)
    }

    pub async fn send_action(&self, action: &Action) -> Result<TransactionReceipt> {
        let payload = codec::decode_hex(&action.to_payload()?)?;
        info!(method = action.method(), "sending action");
        self.input_box_wrapper_add_input(Bytes::from(payload)).await
    }

    pub async fn approve_erc20(&self, token: Address, spender: Address, amount: U256) -> Result<TransactionReceipt> {
        let call = IERC20Mock::approveCall { spender, amount };
        let receipt = self
            .rpc
            .transact(&TransactionRequest::call(self.from, token, call.abi_encode()))
            .await?;
        info!(amount = %amount, spender = %spender, "Approved tokens");
        Ok(receipt)
    }

    pub async fn claim_admin(&self, admin: Address) -> Result<TransactionReceipt> {
        self.send_action(&Action::ClaimAdmin { admin }).await
    }

    pub async fn set_admin(&self, admin: Address) -> Result<TransactionReceipt> {
        self.send_action(&Action::SetAdmin { admin }).await
    }

    pub async fn set_input_box_wrapper(&self, input_box_wrapper: Address) -> Result<TransactionReceipt> {
        self.send_action(&Action::SetInputBoxWrapper { input_box_wrapper })
            .await
    }

    pub async fn set_yield_bridge(&self, yield_bridge: Address) -> Result<TransactionReceipt> {
        self.send_action(&Action::SetYieldBridge { yield_bridge }).await
    }

    pub async fn stream(
        &self,
        token: Address,
        receiver: Address,
        amount: Amount,
        duration: u64,
        start: u64,
    ) -> Result<TransactionReceipt> {
        self.send_action(&Action::Stream {
            token,
            receiver,
            amount,
            duration,
            start,
        })
        .await
    }

    pub async fn withdraw(&self, token: Address, amount: Amount, recipient: Address) -> Result<TransactionReceipt> {
        self.send_action(&Action::Withdraw {
            token,
            amount,
            recipient,
        })
        .await
    }

    pub async fn cancel_stream(&self, token: Address, stream_id: i64) -> Result<TransactionReceipt> {
        self.send_action(&Action::CancelStream {
            token,
            stream_id,
            parent_id: None,
        })
        .await
    }
}
