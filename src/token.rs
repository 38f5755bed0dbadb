//! Stream-rebase token ledger
//!
//! Holders own *shares* of a token's total assets. A rebase rewrites the total
//! assets (the bridge reports yield), which rescales every balance at once.
//! Transfers are linear streams that are folded into stored shares lazily:
//! whenever an account acts, its finished streams are settled first.

use crate::amount::{self, Amount};
use crate::error::{DappError, Result};
use crate::persistence::{Database, TokenTotals};
use crate::stream::{NewStream, Stream};
use alloy_primitives::Address;
use tracing::debug;

pub struct StreamRebaseToken<'a> {
    db: &'a Database,
    address: Address,
}

impl<'a> StreamRebaseToken<'a> {
    pub fn new(db: &'a Database, address: Address) -> Self {
        Self { db, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn totals(&self) -> Result<TokenTotals> {
        self.db.token_totals(&self.address)
    }

    /// Balance implied by stored shares alone, ignoring unsettled streams.
    pub fn stored_balance(&self, wallet: &Address) -> Result<Amount> {
        let shares = self.db.user_shares(wallet, &self.address)?;
        let totals = self.totals()?;
        amount::shares_to_assets(shares, totals.shares, totals.assets)
    }

    pub fn stored_total_supply(&self) -> Result<Amount> {
        Ok(self.totals()?.assets)
    }

    fn set_stored_user_shares(&self, wallet: &Address, shares: Amount) -> Result<()> {
        self.db.set_user_shares(wallet, &self.address, shares)
    }

    /// Settle every finished stream touching `account` into stored shares.
    pub fn process_streams(&self, account: &Address, now: u64) -> Result<()> {
        let ended = self.db.ended_streams(account, &self.address, now)?;

        let mut balance = self.stored_balance(account)?;
        let totals = self.totals()?;

        for stream in &ended {
            self.db.mark_stream_accrued(stream.id)?;
            let streamed = stream.streamed_amount(now)?;

            if stream.from == *account {
                balance = amount::checked_sub(balance, streamed)?;
                let balance_to = amount::checked_add(self.stored_balance(&stream.to)?, streamed)?;
                let shares = amount::assets_to_shares(balance_to, totals.shares, totals.assets)?;
                self.set_stored_user_shares(&stream.to, shares)?;
            }
            if stream.to == *account {
                balance = amount::checked_add(balance, streamed)?;
                let balance_from = amount::checked_sub(self.stored_balance(&stream.from)?, streamed)?;
                let shares = amount::assets_to_shares(balance_from, totals.shares, totals.assets)?;
                self.set_stored_user_shares(&stream.from, shares)?;
            }
        }

        if !ended.is_empty() {
            debug!(account = %account, token = %self.address, settled = ended.len(), "settled streams");
        }

        let shares = amount::assets_to_shares(balance, totals.shares, totals.assets)?;
        self.set_stored_user_shares(account, shares)
    }

    pub fn mint_shares(&self, shares: Amount, wallet: &Address) -> Result<()> {
        if shares <= Amount::ZERO {
            return Err(DappError::InvalidAmount("Shares amount must be positive.".to_string()));
        }
        let totals = self.totals()?;
        self.db
            .set_total_shares(&self.address, amount::checked_add(totals.shares, shares)?)?;

        let current = self.db.user_shares(wallet, &self.address)?;
        self.set_stored_user_shares(wallet, amount::checked_add(current, shares)?)
    }

    pub fn mint_assets(&self, assets: Amount, wallet: &Address) -> Result<()> {
        if assets <= Amount::ZERO {
            return Err(DappError::InvalidAmount("Asset amount must be positive.".to_string()));
        }
        let totals = self.totals()?;

        let new_shares = if totals.assets.is_zero() {
            assets
        } else {
            amount::assets_to_shares(assets, totals.shares, totals.assets)?
        };
        self.db
            .set_total_assets(&self.address, amount::checked_add(totals.assets, assets)?)?;

        self.mint_shares(new_shares, wallet)
    }

    /// Adopt the bridge-reported asset total.
    pub fn rebase(&self, new_total_assets: Amount) -> Result<()> {
        debug!(token = %self.address, total_assets = %amount::format_amount(new_total_assets), "rebase");
        self.db.set_total_assets(&self.address, new_total_assets)
    }

    pub fn burn_assets(&self, assets: Amount, sender: &Address, now: u64) -> Result<()> {
        self.process_streams(sender, now)?;
        if assets <= Amount::ZERO {
            return Err(DappError::InvalidAmount("Asset amount must be positive.".to_string()));
        }

        let totals = self.totals()?;
        let user_shares = self.db.user_shares(sender, &self.address)?;
        let shares_to_burn = amount::assets_to_shares(assets, totals.shares, totals.assets)?;

        if shares_to_burn > user_shares {
            return Err(DappError::InsufficientFunds(
                "Not enough shares to burn the requested assets.".to_string(),
            ));
        }

        self.set_stored_user_shares(sender, amount::checked_sub(user_shares, shares_to_burn)?)?;
        self.db
            .set_total_assets(&self.address, amount::checked_sub(totals.assets, assets)?)?;
        self.db
            .set_total_shares(&self.address, amount::checked_sub(totals.shares, shares_to_burn)?)
    }

    pub fn burn_shares(&self, shares: Amount, sender: &Address, now: u64) -> Result<()> {
        self.process_streams(sender, now)?;
        if shares <= Amount::ZERO {
            return Err(DappError::InvalidAmount("Shares amount must be positive.".to_string()));
        }

        let totals = self.totals()?;
        let user_shares = self.db.user_shares(sender, &self.address)?;
        if shares > user_shares {
            return Err(DappError::InsufficientFunds("Not enough shares to burn.".to_string()));
        }
        let assets = amount::shares_to_assets(shares, totals.shares, totals.assets)?;

        self.set_stored_user_shares(sender, amount::checked_sub(user_shares, shares)?)?;
        self.db
            .set_total_assets(&self.address, amount::checked_sub(totals.assets, assets)?)?;
        self.db
            .set_total_shares(&self.address, amount::checked_sub(totals.shares, shares)?)
    }

    /// Balance at `at`, counting the streamed part of every unsettled stream.
    pub fn balance_of(&self, account: &Address, at: u64) -> Result<Amount> {
        self.balance_with_horizon(account, at, true, 0)
    }

    /// Like [`balance_of`](Self::balance_of), but incoming streams can be
    /// frozen at `recipient_until` by passing `count_received = false`.
    /// Outgoing streams are always evaluated at `at`.
    pub fn balance_with_horizon(
        &self,
        account: &Address,
        at: u64,
        count_received: bool,
        recipient_until: u64,
    ) -> Result<Amount> {
        let mut balance = self.stored_balance(account)?;
        let recipient_until = if count_received { at } else { recipient_until };

        for stream in self.db.pending_streams(account, &self.address, at)? {
            if stream.to == *account {
                balance = amount::checked_add(balance, stream.streamed_amount(recipient_until)?)?;
            } else {
                balance = amount::checked_sub(balance, stream.streamed_amount(at)?)?;
            }
        }

        Ok(balance)
    }

    /// Balance once every stream touching the account has run its course,
    /// or at `at` when given. A zero `at` means no horizon. Read-only.
    pub fn future_balance_of(&self, account: &Address, at: Option<u64>) -> Result<Amount> {
        let horizon = match at {
            Some(at) if at != 0 => at,
            _ => self.db.max_end_timestamp(account)?,
        };
        self.balance_of(account, horizon)
    }

    pub fn streams(&self, account: &Address) -> Result<Vec<Stream>> {
        self.db.wallet_streams(account, &self.address)
    }

    /// Open a stream of `amount` from `sender` to `receiver`.
    ///
    /// The sender must be able to cover the stream at the latest point any of
    /// its streams is still running, counting only what it has received so far.
    pub fn transfer(
        &self,
        receiver: &Address,
        amount: Amount,
        duration: u64,
        start_timestamp: u64,
        sender: &Address,
        now: u64,
    ) -> Result<i64> {
        self.process_streams(sender, now)?;

        let start_timestamp = if start_timestamp == 0 { now } else { start_timestamp };
        if start_timestamp < now {
            return Err(DappError::StreamError("Start timestamp must be in the future.".to_string()));
        }
        if sender == receiver {
            return Err(DappError::StreamError("Sender and receiver must be different.".to_string()));
        }
        if amount < Amount::ZERO {
            return Err(DappError::InvalidAmount("Amount must be positive.".to_string()));
        }
        let end_timestamp = match start_timestamp.checked_add(duration) {
            Some(end) if end <= i64::MAX as u64 => end,
            _ => return Err(DappError::StreamError("Stream ends too far in the future.".to_string())),
        };

        let horizon = end_timestamp.max(self.db.max_end_timestamp(sender)?);
        let available = self.balance_with_horizon(sender, horizon, false, now)?;
        if available < amount {
            return Err(DappError::InsufficientFunds(
                "Insufficient future balance to transfer. Check your streams.".to_string(),
            ));
        }

        let id = self.db.insert_stream(&NewStream {
            from: *sender,
            to: *receiver,
            start_timestamp,
            duration,
            amount,
            token: self.address,
        })?;
        debug!(stream_id = id, from = %sender, to = %receiver, "stream opened");
        Ok(id)
    }

    pub fn cancel_stream(&self, stream_id: i64, sender: &Address, now: u64) -> Result<()> {
        self.process_streams(sender, now)?;

        let stream = match self.db.stream_by_id(stream_id)? {
            Some(stream) if stream.token == self.address => stream,
            _ => return Err(DappError::StreamError("Stream not found.".to_string())),
        };
        if stream.from != *sender {
            return Err(DappError::StreamError("Sender is not the stream owner.".to_string()));
        }
        if stream.end_timestamp() < now {
            return Err(DappError::StreamError("Stream is already completed.".to_string()));
        }

        if stream.start_timestamp > now {
            self.db.delete_stream(stream_id)
        } else {
            let streamed = stream.streamed_amount(now)?;
            self.db
                .update_stream_amount_duration(stream_id, now - stream.start_timestamp, streamed)
        }
    }

    /// Sum of every holder's fully-settled balance. Equals the stored total
    /// supply when the ledger is consistent, up to share rounding.
    pub fn settled_supply(&self) -> Result<Amount> {
        let mut total = Amount::ZERO;
        for holder in self.db.token_holders(&self.address)? {
            if holder == self.address {
                continue;
            }
            total = amount::checked_add(total, self.balance_of(&holder, i64::MAX as u64)?)?;
        }
        Ok(total)
    }
}
