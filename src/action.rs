//! JSON actions carried inside rollup inputs
//!
//! An action is `{"method": ..., "args": {...}}`. Senders are inconsistent
//! about numbers (the scripts stringify amounts, durations arrive as JSON
//! numbers), so every numeric field accepts both forms. Amounts are read
//! from the raw document text so integers wider than 64 bits keep every
//! digit.

use crate::amount::{self, Amount};
use crate::codec;
use crate::error::{DappError, Result};
use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum Action {
    ClaimAdmin {
        admin: Address,
    },
    SetAdmin {
        admin: Address,
    },
    SetInputBoxWrapper {
        input_box_wrapper: Address,
    },
    SetYieldBridge {
        yield_bridge: Address,
    },
    Stream {
        token: Address,
        receiver: Address,
        #[serde(serialize_with = "serialize_amount", deserialize_with = "deserialize_amount")]
        amount: Amount,
        #[serde(deserialize_with = "deserialize_u64")]
        duration: u64,
        #[serde(deserialize_with = "deserialize_u64")]
        start: u64,
    },
    Withdraw {
        token: Address,
        #[serde(serialize_with = "serialize_amount", deserialize_with = "deserialize_amount")]
        amount: Amount,
        recipient: Address,
    },
    CancelStream {
        token: Address,
        #[serde(deserialize_with = "deserialize_i64")]
        stream_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
    },
}

impl Action {
    pub const METHODS: [&'static str; 7] = [
        "claim_admin",
        "set_admin",
        "set_input_box_wrapper",
        "set_yield_bridge",
        "stream",
        "withdraw",
        "cancel_stream",
    ];

    /// Parse an action document. A method outside [`Action::METHODS`] is
    /// reported as [`DappError::UnknownMethod`] rather than a parse failure.
    pub fn from_json(text: &str) -> Result<Self> {
        let envelope: Envelope<'_> = serde_json::from_str(text)?;
        let method = envelope
            .method
            .as_str()
            .ok_or_else(|| DappError::InvalidInput("action has no method".to_string()))?;

        if !Self::METHODS.contains(&method) {
            return Err(DappError::UnknownMethod(method.to_string()));
        }

        // Tag first, so the variant fields are read straight from the text
        let method = serde_json::to_string(method)?;
        let document = match envelope.args {
            Some(args) => format!(r#"{{"method":{},"args":{}}}"#, method, args.get()),
            None => format!(r#"{{"method":{}}}"#, method),
        };
        serde_json::from_str(&document).map_err(|e| DappError::InvalidInput(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DappError::InvalidInput(format!("action is not UTF-8: {}", e)))?;
        Self::from_json(text)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Action::ClaimAdmin { .. } => "claim_admin",
            Action::SetAdmin { .. } => "set_admin",
            Action::SetInputBoxWrapper { .. } => "set_input_box_wrapper",
            Action::SetYieldBridge { .. } => "set_yield_bridge",
            Action::Stream { .. } => "stream",
            Action::Withdraw { .. } => "withdraw",
            Action::CancelStream { .. } => "cancel_stream",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// `0x`-hex of the JSON document, ready to submit as an input.
    pub fn to_payload(&self) -> Result<String> {
        Ok(codec::str_to_hex(&self.to_json()?))
    }
}

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(default)]
    method: serde_json::Value,
    #[serde(borrow)]
    args: Option<&'a RawValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(serde_json::Number),
    Text(String),
}

impl NumberOrText {
    fn into_text(self) -> String {
        match self {
            NumberOrText::Number(n) => n.to_string(),
            NumberOrText::Text(s) => s,
        }
    }
}

fn serialize_amount<S: Serializer>(value: &Amount, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&amount::format_amount(*value))
}

/// Only works against the JSON text deserializer, which is what
/// [`Action::from_json`] drives.
fn deserialize_amount<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Amount, D::Error> {
    let raw = Box::<RawValue>::deserialize(d)?;
    let raw = raw.get().trim();
    let text = if raw.starts_with('"') {
        serde_json::from_str::<String>(raw).map_err(serde::de::Error::custom)?
    } else {
        raw.to_string()
    };
    amount::parse_amount(&text).map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    let text = NumberOrText::deserialize(d)?.into_text();
    text.trim().parse::<u64>().map_err(serde::de::Error::custom)
}

fn deserialize_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    let text = NumberOrText::deserialize(d)?.into_text();
    text.trim().parse::<i64>().map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_opt_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    match Option::<NumberOrText>::deserialize(d)? {
        Some(value) => value
            .into_text()
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap()
    }

    #[test]
    fn test_stream_accepts_string_and_number_fields() {
        let text = format!(
            r#"{{"method":"stream","args":{{"token":"{t}","receiver":"{t}","amount":"1000","duration":"60","start":0}}}}"#,
            t = token()
        );
        let action = Action::from_json(&text).unwrap();
        assert_eq!(
            action,
            Action::Stream {
                token: token(),
                receiver: token(),
                amount: amount::from_u64(1000),
                duration: 60,
                start: 0,
            }
        );
    }

    #[test]
    fn test_unknown_method_is_distinguished() {
        let err = Action::from_json(r#"{"method":"swap","args":{}}"#).unwrap_err();
        assert_eq!(err, DappError::UnknownMethod("swap".to_string()));
        assert_eq!(err.to_string(), "Unknown method swap");
    }

    #[test]
    fn test_missing_method_is_invalid() {
        assert!(matches!(Action::from_json(r#"{"args":{}}"#), Err(DappError::InvalidInput(_))));
        assert!(Action::from_json("not json").is_err());
    }

    #[test]
    fn test_bad_address_is_invalid() {
        let err = Action::from_json(r#"{"method":"claim_admin","args":{"admin":"0x1234"}}"#).unwrap_err();
        assert!(matches!(err, DappError::InvalidInput(_)));
    }

    #[test]
    fn test_withdraw_serializes_amount_as_string() {
        let action = Action::Withdraw {
            token: token(),
            amount: amount::parse_amount("200000000000000000000").unwrap(),
            recipient: token(),
        };
        let json: serde_json::Value = serde_json::from_str(&action.to_json().unwrap()).unwrap();
        assert_eq!(json["method"], "withdraw");
        assert_eq!(json["args"]["amount"], "200000000000000000000");

        let payload = action.to_payload().unwrap();
        let decoded = Action::from_json(&codec::hex_to_str(&payload).unwrap()).unwrap();
        assert_eq!(decoded, action);
    }

    #[test]
    fn test_cancel_stream_tolerates_parent_id() {
        let text = format!(
            r#"{{"method":"cancel_stream","args":{{"token":"{}","stream_id":"3","parent_id":null}}}}"#,
            token()
        );
        let action = Action::from_json(&text).unwrap();
        assert_eq!(action.method(), "cancel_stream");
        assert!(matches!(action, Action::CancelStream { stream_id: 3, parent_id: None, .. }));
    }

    #[test]
    fn test_wide_number_amount_keeps_every_digit() {
        let text = format!(
            r#"{{"method":"withdraw","args":{{"token":"{t}","amount":200000000000000000000,"recipient":"{t}"}}}}"#,
            t = token()
        );
        let action = Action::from_json(&text).unwrap();
        assert_eq!(
            action,
            Action::Withdraw {
                token: token(),
                amount: amount::parse_amount("200000000000000000000").unwrap(),
                recipient: token(),
            }
        );

        // Arguments ahead of the method parse the same way
        let text = format!(
            r#"{{"args":{{"token":"{t}","receiver":"{t}","amount":123456789012345678901,"duration":60,"start":0}},"method":"stream"}}"#,
            t = token()
        );
        match Action::from_json(&text).unwrap() {
            Action::Stream { amount: streamed, .. } => {
                assert_eq!(streamed, amount::parse_amount("123456789012345678901").unwrap())
            }
            other => panic!("expected a stream, got {:?}", other),
        }
    }

    #[test]
    fn test_fractional_amount_is_invalid() {
        let text = format!(
            r#"{{"method":"withdraw","args":{{"token":"{t}","amount":1.5,"recipient":"{t}"}}}}"#,
            t = token()
        );
        assert!(matches!(Action::from_json(&text), Err(DappError::InvalidInput(_))));
    }
}
