//! Linear token streams

use crate::amount::{self, Amount};
use crate::error::Result;
use alloy_primitives::Address;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stream {
    pub id: i64,
    pub from: Address,
    pub to: Address,
    pub start_timestamp: u64,
    pub duration: u64,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: Amount,
    pub token: Address,
    pub accrued: bool,
}

fn serialize_amount<S: serde::Serializer>(value: &Amount, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&amount::format_amount(*value))
}

/// A stream that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewStream {
    pub from: Address,
    pub to: Address,
    pub start_timestamp: u64,
    pub duration: u64,
    pub amount: Amount,
    pub token: Address,
}

impl Stream {
    pub fn end_timestamp(&self) -> u64 {
        self.start_timestamp.saturating_add(self.duration)
    }

    pub fn has_started(&self, timestamp: u64) -> bool {
        timestamp >= self.start_timestamp
    }

    pub fn has_ended(&self, timestamp: u64) -> bool {
        timestamp >= self.end_timestamp()
    }

    pub fn is_active(&self, timestamp: u64) -> bool {
        self.has_started(timestamp) && !self.has_ended(timestamp)
    }

    /// Amount released to the receiver by `until`.
    pub fn streamed_amount(&self, until: u64) -> Result<Amount> {
        if !self.has_started(until) {
            return Ok(Amount::ZERO);
        }
        if self.has_ended(until) {
            return Ok(self.amount);
        }
        // has_ended is false here, so duration > 0
        let elapsed = amount::from_u64(until - self.start_timestamp);
        amount::mul_div(self.amount, elapsed, amount::from_u64(self.duration))
    }
}
