//! Advance and inspect handlers of the native-yield dapp

use crate::action::{self, Action};
use crate::amount;
use crate::codec::{self, Deposit, WrappedInput};
use crate::error::{DappError, Result};
use crate::persistence::{Database, DappRole};
use crate::rollup::{AdvanceData, InspectData, Outcome, Output, RollupRequest};
use crate::token::StreamRebaseToken;
use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Body of every report the dapp emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub error: bool,
    pub message: String,
    pub payload: String,
}

impl Report {
    pub fn success(message: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
            payload: payload.into(),
        }
    }

    pub fn failure(message: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            payload: payload.into(),
        }
    }

    pub fn into_output(self) -> Result<Output> {
        Ok(Output::Report {
            payload: codec::str_to_hex(&serde_json::to_string(&self)?),
        })
    }

    /// Decode the `payload` of a report output back into a report.
    pub fn from_hex(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(&codec::hex_to_str(payload)?)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "data", rename_all = "snake_case")]
enum InspectQuery {
    Balance {
        token_address: Address,
        wallet_address: Address,
        #[serde(deserialize_with = "action::deserialize_u64")]
        timestamp: u64,
    },
    FutureBalance {
        token_address: Address,
        wallet_address: Address,
        #[serde(default, deserialize_with = "action::deserialize_opt_u64")]
        timestamp: Option<u64>,
    },
    Streams {
        token_address: Address,
        wallet_address: Address,
    },
    #[serde(other)]
    Other,
}

pub struct Dapp {
    db: Database,
}

impl Dapp {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn handle(&self, request: &RollupRequest) -> Outcome {
        match request {
            RollupRequest::AdvanceState(data) => self.handle_advance(data),
            RollupRequest::InspectState(data) => self.handle_inspect(data),
        }
    }

    /// Apply one input. State changes are kept only when the whole action succeeds.
    pub fn handle_advance(&self, data: &AdvanceData) -> Outcome {
        info!(
            msg_sender = %data.metadata.msg_sender,
            input_index = data.metadata.input_index,
            "Received advance request"
        );

        match self.db.atomically(|| self.handle_action(data)) {
            Ok(mut outputs) => {
                let echoed = match serde_json::to_string(data) {
                    Ok(json) => codec::str_to_hex(&json),
                    Err(e) => {
                        error!(error = %e, "could not encode echoed request");
                        String::new()
                    }
                };
                match Report::success("Success", echoed).into_output() {
                    Ok(report) => outputs.push(report),
                    Err(e) => error!(error = %e, "could not encode success report"),
                }
                Outcome::accept(outputs)
            }
            Err(e) => self.reject(&e, &data.payload),
        }
    }

    pub fn handle_action(&self, data: &AdvanceData) -> Result<Vec<Output>> {
        let input = WrappedInput::decode(&codec::decode_hex(&data.payload)?)?;
        let parent = data.metadata.msg_sender;
        let sender = input.sender;
        let now = data.metadata.timestamp;

        let admin = self.db.dapp_address(DappRole::Admin)?;
        let from_wrapper = parent == self.db.dapp_address(DappRole::InputBoxWrapper)?;
        let from_bridge = sender == self.db.dapp_address(DappRole::YieldBridge)?;

        let mut encoded_action: Bytes = input.action.clone();

        if from_bridge {
            self.only_input_box_wrapper(&parent)?;
            let deposit = Deposit::decode(&input.action)?;
            info!(
                token = %deposit.token,
                recipient = %deposit.recipient,
                amount = %deposit.amount,
                "bridge deposit"
            );
            StreamRebaseToken::new(&self.db, deposit.token)
                .mint_assets(amount::from_u256(deposit.amount)?, &deposit.recipient)?;
            encoded_action = deposit.data;
        }

        if from_wrapper {
            if input.tokens.len() != input.amounts.len() {
                return Err(DappError::InvalidInput(format!(
                    "{} tokens but {} rebase amounts",
                    input.tokens.len(),
                    input.amounts.len()
                )));
            }
            for (token, total) in input.tokens.iter().zip(&input.amounts) {
                StreamRebaseToken::new(&self.db, *token).rebase(amount::from_u256(*total)?)?;
            }
        }

        if encoded_action.is_empty() {
            return Ok(Vec::new());
        }

        let action = match Action::from_bytes(&encoded_action) {
            Ok(action) => action,
            Err(DappError::UnknownMethod(method)) => {
                self.only_input_box_wrapper(&parent)?;
                return Err(DappError::UnknownMethod(method));
            }
            Err(e) => return Err(e),
        };
        info!(method = action.method(), sender = %sender, "action");

        match &action {
            Action::ClaimAdmin { admin: new_admin } if admin.is_zero() => {
                self.db.set_dapp_address(DappRole::Admin, new_admin)?;
                return Ok(Vec::new());
            }
            Action::SetAdmin { admin: new_admin } => {
                self.only_admin(&sender, &admin)?;
                self.db.set_dapp_address(DappRole::Admin, new_admin)?;
                return Ok(Vec::new());
            }
            Action::SetInputBoxWrapper { input_box_wrapper } => {
                self.only_admin(&sender, &admin)?;
                self.db.set_dapp_address(DappRole::InputBoxWrapper, input_box_wrapper)?;
                return Ok(Vec::new());
            }
            Action::SetYieldBridge { yield_bridge } => {
                self.only_admin(&sender, &admin)?;
                self.db.set_dapp_address(DappRole::YieldBridge, yield_bridge)?;
                return Ok(Vec::new());
            }
            _ => {}
        }

        // Everything below is user activity and has to come through the wrapper
        self.only_input_box_wrapper(&parent)?;

        match action {
            Action::Stream {
                token,
                receiver,
                amount,
                duration,
                start,
            } => {
                StreamRebaseToken::new(&self.db, token)
                    .transfer(&receiver, amount, duration, start, &sender, now)?;
                Ok(Vec::new())
            }
            Action::Withdraw {
                token,
                amount,
                recipient,
            } => {
                StreamRebaseToken::new(&self.db, token).burn_assets(amount, &sender, now)?;

                let calldata = codec::encode_withdraw_call(token, amount::to_u256(amount)?, recipient);
                let voucher = Output::Voucher {
                    destination: self.db.dapp_address(DappRole::YieldBridge)?,
                    payload: codec::bytes_to_hex(&calldata),
                };
                info!(token = %token, recipient = %recipient, "Issuing withdraw voucher");
                Ok(vec![voucher])
            }
            Action::CancelStream { token, stream_id, .. } => {
                StreamRebaseToken::new(&self.db, token).cancel_stream(stream_id, &sender, now)?;
                Ok(Vec::new())
            }
            other => Err(DappError::UnknownMethod(other.method().to_string())),
        }
    }

    /// Answer a read-only query with a report.
    pub fn handle_inspect(&self, data: &InspectData) -> Outcome {
        info!(payload = %data.payload, "Received inspect request");

        match self.inspect_message(&data.payload) {
            Ok(message) => match Report::success(message, data.payload.clone()).into_output() {
                Ok(report) => Outcome::accept(vec![report]),
                Err(e) => self.reject(&e, &data.payload),
            },
            Err(e) => self.reject(&e, &data.payload),
        }
    }

    fn inspect_message(&self, payload: &str) -> Result<String> {
        let query: InspectQuery = serde_json::from_str(&codec::hex_to_str(payload)?)?;

        match query {
            InspectQuery::Balance {
                token_address,
                wallet_address,
                timestamp,
            } => {
                let balance = StreamRebaseToken::new(&self.db, token_address).balance_of(&wallet_address, timestamp)?;
                Ok(amount::format_amount(balance))
            }
            InspectQuery::FutureBalance {
                token_address,
                wallet_address,
                timestamp,
            } => {
                let balance =
                    StreamRebaseToken::new(&self.db, token_address).future_balance_of(&wallet_address, timestamp)?;
                Ok(amount::format_amount(balance))
            }
            InspectQuery::Streams {
                token_address,
                wallet_address,
            } => {
                let streams = StreamRebaseToken::new(&self.db, token_address).streams(&wallet_address)?;
                Ok(serde_json::to_string(&streams)?)
            }
            InspectQuery::Other => Ok("ok".to_string()),
        }
    }

    fn reject(&self, err: &DappError, payload: &str) -> Outcome {
        error!(error = %err, payload = %payload, "request rejected");
        match Report::failure(err.to_string(), payload).into_output() {
            Ok(report) => Outcome::reject(vec![report]),
            Err(_) => Outcome::reject(Vec::new()),
        }
    }

    fn only_admin(&self, sender: &Address, admin: &Address) -> Result<()> {
        if sender != admin {
            return Err(DappError::Unauthorized("Not from admin".to_string()));
        }
        Ok(())
    }

    fn only_input_box_wrapper(&self, parent: &Address) -> Result<()> {
        if *parent != self.db.dapp_address(DappRole::InputBoxWrapper)? {
            return Err(DappError::Unauthorized("Not from input box wrapper".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::{Metadata, Status};
    use alloy_primitives::U256;

    const NOW: u64 = 1722152540;

    fn admin() -> Address {
        Address::repeat_byte(0xad)
    }

    fn wrapper() -> Address {
        Address::repeat_byte(0x77)
    }

    fn advance(parent: Address, sender: Address, action: &Action) -> AdvanceData {
        let input = WrappedInput {
            sender,
            tokens: Vec::new(),
            amounts: Vec::new(),
            action: Bytes::from(action.to_json().unwrap().into_bytes()),
        };
        AdvanceData {
            metadata: Metadata {
                msg_sender: parent,
                epoch_index: 0,
                input_index: 1,
                block_number: 30334,
                timestamp: NOW,
            },
            payload: codec::bytes_to_hex(&input.encode()),
        }
    }

    fn inspect(dapp: &Dapp, query: serde_json::Value) -> (Status, Report) {
        let outcome = dapp.handle_inspect(&InspectData {
            payload: codec::str_to_hex(&query.to_string()),
        });
        let report = match &outcome.outputs[0] {
            Output::Report { payload } => Report::from_hex(payload).unwrap(),
            other => panic!("expected report, got {:?}", other),
        };
        (outcome.status, report)
    }

    #[test]
    fn test_claim_admin_once() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        let outcome = dapp.handle_advance(&advance(admin(), admin(), &Action::ClaimAdmin { admin: admin() }));
        assert_eq!(outcome.status, Status::Accept);
        assert_eq!(dapp.database().dapp_address(DappRole::Admin).unwrap(), admin());

        // A second claim falls through to user methods and fails the wrapper check
        let intruder = Address::repeat_byte(0x66);
        let outcome = dapp.handle_advance(&advance(intruder, intruder, &Action::ClaimAdmin { admin: intruder }));
        assert_eq!(outcome.status, Status::Reject);
        assert_eq!(dapp.database().dapp_address(DappRole::Admin).unwrap(), admin());
    }

    #[test]
    fn test_admin_methods_require_admin() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        dapp.handle_advance(&advance(admin(), admin(), &Action::ClaimAdmin { admin: admin() }));

        let other = Address::repeat_byte(0x01);
        let err = dapp
            .handle_action(&advance(other, other, &Action::SetInputBoxWrapper { input_box_wrapper: wrapper() }))
            .unwrap_err();
        assert_eq!(err.to_string(), "Not from admin");

        dapp.handle_action(&advance(admin(), admin(), &Action::SetInputBoxWrapper { input_box_wrapper: wrapper() }))
            .unwrap();
        assert_eq!(dapp.database().dapp_address(DappRole::InputBoxWrapper).unwrap(), wrapper());
    }

    #[test]
    fn test_rejected_advance_reports_error_and_payload() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        let data = advance(
            admin(),
            admin(),
            &Action::Withdraw {
                token: Address::repeat_byte(0x01),
                amount: amount::from_u64(1),
                recipient: admin(),
            },
        );
        // Wrapper is still the zero address
        let outcome = dapp.handle_advance(&data);
        assert_eq!(outcome.status, Status::Reject);
        assert_eq!(outcome.outputs.len(), 1);

        let report = match &outcome.outputs[0] {
            Output::Report { payload } => Report::from_hex(payload).unwrap(),
            other => panic!("expected report, got {:?}", other),
        };
        assert!(report.error);
        assert_eq!(report.message, "Not from input box wrapper");
        assert_eq!(report.payload, data.payload);
    }

    #[test]
    fn test_success_report_echoes_request() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        let data = advance(admin(), admin(), &Action::ClaimAdmin { admin: admin() });
        let outcome = dapp.handle_advance(&data);

        let report = match &outcome.outputs[0] {
            Output::Report { payload } => Report::from_hex(payload).unwrap(),
            other => panic!("expected report, got {:?}", other),
        };
        assert!(!report.error);
        assert_eq!(report.message, "Success");
        let echoed: AdvanceData = serde_json::from_str(&codec::hex_to_str(&report.payload).unwrap()).unwrap();
        assert_eq!(echoed, data);
    }

    #[test]
    fn test_garbage_payload_is_rejected() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        let mut data = advance(admin(), admin(), &Action::ClaimAdmin { admin: admin() });
        data.payload = "0xdeadbeef".to_string();
        assert_eq!(dapp.handle_advance(&data).status, Status::Reject);
    }

    #[test]
    fn test_rebase_amount_mismatch_is_rejected() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        dapp.database().set_dapp_address(DappRole::InputBoxWrapper, &wrapper()).unwrap();

        let input = WrappedInput {
            sender: admin(),
            tokens: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            amounts: vec![U256::from(5u64)],
            action: Bytes::new(),
        };
        let mut data = advance(wrapper(), admin(), &Action::ClaimAdmin { admin: admin() });
        data.payload = codec::bytes_to_hex(&input.encode());

        assert!(matches!(dapp.handle_action(&data), Err(DappError::InvalidInput(_))));
    }

    #[test]
    fn test_inspect_queries() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        let token = Address::repeat_byte(0x01);
        let wallet = Address::repeat_byte(0x02);
        StreamRebaseToken::new(dapp.database(), token)
            .mint_assets(amount::from_u64(500), &wallet)
            .unwrap();

        let (status, report) = inspect(
            &dapp,
            serde_json::json!({
                "data": "balance",
                "token_address": token,
                "wallet_address": wallet,
                "timestamp": NOW,
            }),
        );
        assert_eq!(status, Status::Accept);
        assert_eq!(report.message, "500");

        let (_, report) = inspect(
            &dapp,
            serde_json::json!({ "data": "future_balance", "token_address": token, "wallet_address": wallet }),
        );
        assert_eq!(report.message, "500");

        let (_, report) = inspect(
            &dapp,
            serde_json::json!({ "data": "streams", "token_address": token, "wallet_address": wallet }),
        );
        assert_eq!(report.message, "[]");

        let (status, report) = inspect(&dapp, serde_json::json!({ "data": "something" }));
        assert_eq!(status, Status::Accept);
        assert_eq!(report.message, "ok");
    }

    #[test]
    fn test_inspect_error_rejects() {
        let dapp = Dapp::new(Database::open(":memory:").unwrap());
        let (status, report) = inspect(&dapp, serde_json::json!({ "data": "balance" }));
        assert_eq!(status, Status::Reject);
        assert!(report.error);
    }
}
