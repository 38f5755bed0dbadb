//! Hex and ABI encodings shared by the dapp and the driver

use crate::error::{DappError, Result};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolValue};

sol! {
    /// Envelope the InputBoxWrapper puts around every input: the initial
    /// caller, the tokens to rebase with their reported totals, and the action.
    #[derive(Debug, PartialEq)]
    struct WrappedInput {
        address sender;
        address[] tokens;
        uint256[] amounts;
        bytes action;
    }

    /// Body the YieldBridge sends through the wrapper on an ERC-20 deposit.
    #[derive(Debug, PartialEq)]
    struct Deposit {
        address token;
        address dapp;
        uint256 amount;
        address recipient;
        bytes data;
    }
}

/// Selector of the YieldBridge withdraw entry point.
pub const WITHDRAW_SELECTOR: [u8; 4] = [0x1f, 0x51, 0x95, 0xb7];

pub fn str_to_hex(text: &str) -> String {
    format!("0x{}", hex::encode(text.as_bytes()))
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    Ok(hex::decode(digits)?)
}

pub fn hex_to_str(text: &str) -> Result<String> {
    let bytes = decode_hex(text)?;
    String::from_utf8(bytes).map_err(|e| DappError::InvalidInput(format!("payload is not UTF-8: {}", e)))
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

impl WrappedInput {
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(<Self as SolValue>::abi_decode_params(data)?)
    }

    pub fn encode(&self) -> Vec<u8> {
        SolValue::abi_encode_params(self)
    }
}

impl Deposit {
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(<Self as SolValue>::abi_decode_params(data)?)
    }

    pub fn encode(&self) -> Vec<u8> {
        SolValue::abi_encode_params(self)
    }
}

/// Calldata for `withdraw(token, amount, recipient)` on the YieldBridge.
pub fn encode_withdraw_call(token: Address, amount: U256, recipient: Address) -> Bytes {
    let mut calldata = WITHDRAW_SELECTOR.to_vec();
    calldata.extend((token, amount, recipient).abi_encode_params());
    Bytes::from(calldata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_hex_round_trip() {
        let hex = str_to_hex("{\"method\":\"claim_admin\"}");
        assert!(hex.starts_with("0x7b"));
        assert_eq!(hex_to_str(&hex).unwrap(), "{\"method\":\"claim_admin\"}");
    }

    #[test]
    fn test_decode_hex_accepts_bare_digits() {
        assert_eq!(decode_hex("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
        assert!(decode_hex("0xzz").is_err());
    }

    #[test]
    fn test_wrapped_input_layout() {
        let input = WrappedInput {
            sender: Address::repeat_byte(0x11),
            tokens: vec![Address::repeat_byte(0x22)],
            amounts: vec![U256::from(7u64)],
            action: Bytes::from_static(b"{}"),
        };
        let encoded = input.encode();

        // Params encoding: the sender word comes first, with no tuple offset
        assert_eq!(&encoded[12..32], Address::repeat_byte(0x11).as_slice());
        assert_eq!(WrappedInput::decode(&encoded).unwrap(), input);
    }

    #[test]
    fn test_wrapped_input_rejects_garbage() {
        assert!(WrappedInput::decode(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn test_deposit_decodes_nested_action() {
        let deposit = Deposit {
            token: Address::repeat_byte(0x01),
            dapp: Address::repeat_byte(0x02),
            amount: U256::from(10u64).pow(U256::from(18u64)),
            recipient: Address::repeat_byte(0x03),
            data: Bytes::new(),
        };
        let decoded = Deposit::decode(&deposit.encode()).unwrap();
        assert_eq!(decoded.recipient, Address::repeat_byte(0x03));
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn test_withdraw_call_layout() {
        let calldata = encode_withdraw_call(Address::repeat_byte(0xaa), U256::from(200u64), Address::repeat_byte(0xbb));
        assert_eq!(calldata.len(), 4 + 3 * 32);
        assert_eq!(&calldata[..4], &WITHDRAW_SELECTOR);
        assert_eq!(&calldata[16..36], Address::repeat_byte(0xaa).as_slice());
        assert_eq!(calldata[67], 200);
        assert_eq!(&calldata[80..100], Address::repeat_byte(0xbb).as_slice());
    }
}
