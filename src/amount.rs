//! Signed 256-bit ledger amounts and the share/asset conversions
//!
//! Every quantity the ledger stores (assets, shares, stream amounts) is an
//! [`Amount`]. Balances are allowed to dip below zero while a counterparty's
//! streams are still unsettled, so the type is signed. Division floors toward
//! negative infinity.

use crate::error::{DappError, Result};
use alloy_primitives::{I256, U256};

pub type Amount = I256;

/// Floor division: rounds toward negative infinity instead of zero.
pub fn floor_div(numerator: Amount, denominator: Amount) -> Result<Amount> {
    let quotient = numerator
        .checked_div(denominator)
        .ok_or(DappError::ArithmeticOverflow)?;
    let product = quotient
        .checked_mul(denominator)
        .ok_or(DappError::ArithmeticOverflow)?;
    let remainder = numerator
        .checked_sub(product)
        .ok_or(DappError::ArithmeticOverflow)?;

    if !remainder.is_zero() && (remainder.is_negative() != denominator.is_negative()) {
        quotient
            .checked_sub(I256::ONE)
            .ok_or(DappError::ArithmeticOverflow)
    } else {
        Ok(quotient)
    }
}

/// `floor(a * b / c)` with overflow reported as an error.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Result<Amount> {
    let product = a.checked_mul(b).ok_or(DappError::ArithmeticOverflow)?;
    floor_div(product, c)
}

pub fn assets_to_shares(assets: Amount, total_shares: Amount, total_assets: Amount) -> Result<Amount> {
    if total_assets.is_zero() {
        return Ok(Amount::ZERO);
    }
    mul_div(assets, total_shares, total_assets)
}

pub fn shares_to_assets(shares: Amount, total_shares: Amount, total_assets: Amount) -> Result<Amount> {
    if total_shares.is_zero() {
        return Ok(Amount::ZERO);
    }
    mul_div(shares, total_assets, total_shares)
}

pub fn checked_add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b).ok_or(DappError::ArithmeticOverflow)
}

pub fn checked_sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b).ok_or(DappError::ArithmeticOverflow)
}

/// Lift an unsigned wire integer (ABI `uint256`) into the ledger domain.
pub fn from_u256(value: U256) -> Result<Amount> {
    I256::try_from(value)
        .map_err(|_| DappError::InvalidAmount(format!("Amount {} exceeds the ledger range", value)))
}

pub fn from_u64(value: u64) -> Amount {
    // u64 always fits in the positive half of I256
    I256::from_raw(U256::from(value))
}

/// Lower a non-negative ledger amount back to a wire integer.
pub fn to_u256(value: Amount) -> Result<U256> {
    if value.is_negative() {
        return Err(DappError::InvalidAmount(format!(
            "Amount {} is negative",
            format_amount(value)
        )));
    }
    Ok(value.into_raw())
}

/// Base-10 text, with a leading `-` for negative values.
pub fn format_amount(value: Amount) -> String {
    if value.is_negative() {
        format!("-{}", value.unsigned_abs())
    } else {
        value.into_raw().to_string()
    }
}

pub fn parse_amount(text: &str) -> Result<Amount> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = U256::from_str_radix(digits, 10)
        .map_err(|e| DappError::InvalidAmount(format!("Invalid amount '{}': {}", text, e)))?;
    let value = from_u256(magnitude)?;
    if negative {
        value.checked_neg().ok_or(DappError::ArithmeticOverflow)
    } else {
        Ok(value)
    }
}
