//! Database persistence layer for YieldStream
//!
//! Every piece of ledger state lives in one SQLite file: the three dapp
//! role addresses, per-token totals, per-account shares and the stream table.
//! Amounts are stored as base-10 text, addresses in checksum form.

use crate::amount::{self, Amount};
use crate::error::{DappError, Result};
use crate::stream::{NewStream, Stream};
use alloy_primitives::Address;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS dapp_addresses (
        name TEXT PRIMARY KEY,
        address TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS account (
        address TEXT PRIMARY KEY
    );
    CREATE TABLE IF NOT EXISTS token (
        address TEXT PRIMARY KEY,
        total_assets TEXT NOT NULL,
        total_shares TEXT NOT NULL,
        FOREIGN KEY (address) REFERENCES account(address)
    );
    CREATE TABLE IF NOT EXISTS balance (
        shares TEXT NOT NULL,
        account_address TEXT NOT NULL,
        token_address TEXT NOT NULL,
        FOREIGN KEY (account_address) REFERENCES account(address),
        FOREIGN KEY (token_address) REFERENCES token(address),
        PRIMARY KEY (account_address, token_address)
    );
    CREATE TABLE IF NOT EXISTS stream (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_address TEXT NOT NULL,
        to_address TEXT NOT NULL,
        start_timestamp INTEGER NOT NULL,
        duration INTEGER NOT NULL,
        amount TEXT NOT NULL,
        token_address TEXT NOT NULL,
        accrued INTEGER NOT NULL,
        FOREIGN KEY (token_address) REFERENCES token(address),
        FOREIGN KEY (from_address) REFERENCES account(address),
        FOREIGN KEY (to_address) REFERENCES account(address)
    );
    CREATE INDEX IF NOT EXISTS idx_stream_from_address ON stream(from_address);
    CREATE INDEX IF NOT EXISTS idx_stream_to_address ON stream(to_address);
    CREATE INDEX IF NOT EXISTS idx_stream_token_address ON stream(token_address);
    CREATE INDEX IF NOT EXISTS idx_stream_accrued ON stream(accrued);
";

const STREAM_COLUMNS: &str =
    "id, from_address, to_address, start_timestamp, duration, amount, token_address, accrued";

/// The three addresses the dapp trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DappRole {
    Admin,
    InputBoxWrapper,
    YieldBridge,
}

impl DappRole {
    pub const ALL: [DappRole; 3] = [DappRole::Admin, DappRole::InputBoxWrapper, DappRole::YieldBridge];

    pub fn as_str(&self) -> &'static str {
        match self {
            DappRole::Admin => "admin",
            DappRole::InputBoxWrapper => "input_box_wrapper",
            DappRole::YieldBridge => "yield_bridge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenTotals {
    pub assets: Amount,
    pub shares: Amount,
}

pub fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// Stored timestamps and durations must fit an SQLite INTEGER.
fn to_sql_timestamp(timestamp: u64) -> Result<i64> {
    i64::try_from(timestamp)
        .map_err(|_| DappError::StreamError(format!("Timestamp {} is out of range.", timestamp)))
}

/// Comparison bound for queries. Anything past the INTEGER range compares
/// like the maximum.
fn to_sql_bound(timestamp: u64) -> i64 {
    i64::try_from(timestamp).unwrap_or(i64::MAX)
}

/// `start + duration` is summed in SQL, so the end must fit as well.
fn to_sql_span(start: u64, duration: u64) -> Result<(i64, i64)> {
    let start_sql = to_sql_timestamp(start)?;
    let duration_sql = to_sql_timestamp(duration)?;
    start_sql
        .checked_add(duration_sql)
        .ok_or_else(|| DappError::StreamError(format!("Stream end {} + {} is out of range.", start, duration)))?;
    Ok((start_sql, duration_sql))
}

fn from_sql_timestamp(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_address_column(text: &str) -> rusqlite::Result<Address> {
    text.parse::<Address>().map_err(|_| rusqlite::Error::InvalidQuery)
}

fn parse_amount_column(text: &str) -> rusqlite::Result<Amount> {
    amount::parse_amount(text).map_err(|_| rusqlite::Error::InvalidQuery)
}

fn stream_from_row(row: &Row<'_>) -> rusqlite::Result<Stream> {
    let from: String = row.get(1)?;
    let to: String = row.get(2)?;
    let start: i64 = row.get(3)?;
    let duration: i64 = row.get(4)?;
    let amount: String = row.get(5)?;
    let token: String = row.get(6)?;
    let accrued: i64 = row.get(7)?;

    Ok(Stream {
        id: row.get(0)?,
        from: parse_address_column(&from)?,
        to: parse_address_column(&to)?,
        start_timestamp: from_sql_timestamp(start),
        duration: from_sql_timestamp(duration),
        amount: parse_amount_column(&amount)?,
        token: parse_address_column(&token)?,
        accrued: accrued == 1,
    })
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the ledger at `path`. `:memory:` gives a private in-memory ledger.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DappError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DappError::DatabaseError(format!("Failed to enable foreign keys: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| DappError::DatabaseError(format!("Failed to create schema: {}", e)))?;

        for role in DappRole::ALL {
            conn.execute(
                "INSERT OR IGNORE INTO dapp_addresses (name, address) VALUES (?1, ?2)",
                params![role.as_str(), checksum(&Address::ZERO)],
            )
            .map_err(|e| DappError::DatabaseError(format!("Failed to seed dapp addresses: {}", e)))?;
        }

        Ok(Database { conn: Mutex::new(conn) })
    }

    /// Delete whatever ledger exists at `path` and start from an empty one.
    pub fn reset(path: &str) -> Result<Self> {
        if path != ":memory:" && Path::new(path).exists() {
            std::fs::remove_file(path)?;
        }
        Self::open(path)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DappError::DatabaseError("Mutex poisoned".to_string()))
    }

    /// Run `f` inside a savepoint. Changes are kept only when `f` succeeds.
    pub fn atomically<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn()?.execute_batch("SAVEPOINT atomic")?;
        match f() {
            Ok(value) => {
                self.conn()?.execute_batch("RELEASE SAVEPOINT atomic")?;
                Ok(value)
            }
            Err(e) => {
                self.conn()?
                    .execute_batch("ROLLBACK TO SAVEPOINT atomic; RELEASE SAVEPOINT atomic")?;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Dapp role addresses
    // ------------------------------------------------------------------

    pub fn dapp_address(&self, role: DappRole) -> Result<Address> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT address FROM dapp_addresses WHERE name = ?1",
                params![role.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(text) => text
                .parse::<Address>()
                .map_err(|_| DappError::InvalidAddress(text)),
            None => Ok(Address::ZERO),
        }
    }

    pub fn set_dapp_address(&self, role: DappRole, address: &Address) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO dapp_addresses (name, address) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET address = excluded.address",
            params![role.as_str(), checksum(address)],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accounts and tokens
    // ------------------------------------------------------------------

    fn ensure_account(conn: &Connection, address: &Address) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO account (address) VALUES (?1)",
            params![checksum(address)],
        )?;
        Ok(())
    }

    fn ensure_token(conn: &Connection, token: &Address) -> Result<()> {
        Self::ensure_account(conn, token)?;
        conn.execute(
            "INSERT OR IGNORE INTO token (address, total_assets, total_shares) VALUES (?1, '0', '0')",
            params![checksum(token)],
        )?;
        Ok(())
    }

    pub fn token_totals(&self, token: &Address) -> Result<TokenTotals> {
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT total_assets, total_shares FROM token WHERE address = ?1",
                params![checksum(token)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((assets, shares)) => Ok(TokenTotals {
                assets: amount::parse_amount(&assets)?,
                shares: amount::parse_amount(&shares)?,
            }),
            None => Ok(TokenTotals {
                assets: Amount::ZERO,
                shares: Amount::ZERO,
            }),
        }
    }

    pub fn set_total_assets(&self, token: &Address, total_assets: Amount) -> Result<()> {
        let conn = self.conn()?;
        Self::ensure_token(&conn, token)?;
        conn.execute(
            "UPDATE token SET total_assets = ?1 WHERE address = ?2",
            params![amount::format_amount(total_assets), checksum(token)],
        )?;
        Ok(())
    }

    pub fn set_total_shares(&self, token: &Address, total_shares: Amount) -> Result<()> {
        let conn = self.conn()?;
        Self::ensure_token(&conn, token)?;
        conn.execute(
            "UPDATE token SET total_shares = ?1 WHERE address = ?2",
            params![amount::format_amount(total_shares), checksum(token)],
        )?;
        Ok(())
    }

    pub fn user_shares(&self, account: &Address, token: &Address) -> Result<Amount> {
        let conn = self.conn()?;
        let shares: Option<String> = conn
            .query_row(
                "SELECT shares FROM balance WHERE account_address = ?1 AND token_address = ?2",
                params![checksum(account), checksum(token)],
                |row| row.get(0),
            )
            .optional()?;

        match shares {
            Some(text) => amount::parse_amount(&text),
            None => Ok(Amount::ZERO),
        }
    }

    pub fn set_user_shares(&self, account: &Address, token: &Address, shares: Amount) -> Result<()> {
        let conn = self.conn()?;
        Self::ensure_account(&conn, account)?;
        Self::ensure_token(&conn, token)?;
        conn.execute(
            "INSERT INTO balance (account_address, token_address, shares) VALUES (?1, ?2, ?3)
             ON CONFLICT(account_address, token_address) DO UPDATE SET shares = excluded.shares",
            params![checksum(account), checksum(token), amount::format_amount(shares)],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    pub fn insert_stream(&self, stream: &NewStream) -> Result<i64> {
        let (start, duration) = to_sql_span(stream.start_timestamp, stream.duration)?;
        let conn = self.conn()?;
        Self::ensure_account(&conn, &stream.from)?;
        Self::ensure_account(&conn, &stream.to)?;
        Self::ensure_token(&conn, &stream.token)?;
        conn.execute(
            "INSERT INTO stream (from_address, to_address, start_timestamp, duration, amount, token_address, accrued)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                checksum(&stream.from),
                checksum(&stream.to),
                start,
                duration,
                amount::format_amount(stream.amount),
                checksum(&stream.token),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn stream_by_id(&self, id: i64) -> Result<Option<Stream>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM stream WHERE id = ?1", STREAM_COLUMNS);
        let stream = conn.query_row(&sql, params![id], stream_from_row).optional()?;
        Ok(stream)
    }

    pub fn delete_stream(&self, id: i64) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM stream WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn mark_stream_accrued(&self, id: i64) -> Result<()> {
        self.conn()?
            .execute("UPDATE stream SET accrued = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn update_stream_amount_duration(&self, id: i64, duration: u64, amount: Amount) -> Result<()> {
        self.conn()?.execute(
            "UPDATE stream SET duration = ?1, amount = ?2 WHERE id = ?3",
            params![to_sql_timestamp(duration)?, amount::format_amount(amount), id],
        )?;
        Ok(())
    }

    fn query_streams<P: rusqlite::Params>(&self, filter: &str, params: P) -> Result<Vec<Stream>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM stream WHERE {} ORDER BY id ASC", STREAM_COLUMNS, filter);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, stream_from_row)?;

        let mut streams = Vec::new();
        for row in rows {
            streams.push(row?);
        }
        Ok(streams)
    }

    /// Unaccrued streams touching `account` that finished by `now`.
    pub fn ended_streams(&self, account: &Address, token: &Address, now: u64) -> Result<Vec<Stream>> {
        let account = checksum(account);
        self.query_streams(
            "(from_address = ?1 OR to_address = ?1) AND token_address = ?2
             AND start_timestamp + duration <= ?3 AND accrued = 0",
            params![account, checksum(token), to_sql_bound(now)],
        )
    }

    /// Unaccrued streams touching `account` that started by `until`.
    pub fn pending_streams(&self, account: &Address, token: &Address, until: u64) -> Result<Vec<Stream>> {
        let account = checksum(account);
        self.query_streams(
            "(from_address = ?1 OR to_address = ?1) AND token_address = ?2
             AND accrued = 0 AND start_timestamp <= ?3",
            params![account, checksum(token), to_sql_bound(until)],
        )
    }

    pub fn wallet_streams(&self, account: &Address, token: &Address) -> Result<Vec<Stream>> {
        let account = checksum(account);
        self.query_streams(
            "(from_address = ?1 OR to_address = ?1) AND token_address = ?2",
            params![account, checksum(token)],
        )
    }

    /// Latest end timestamp over every stream touching `account`, in any token.
    pub fn max_end_timestamp(&self, account: &Address) -> Result<u64> {
        let conn = self.conn()?;
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(start_timestamp + duration) FROM stream
             WHERE from_address = ?1 OR to_address = ?1",
            params![checksum(account)],
            |row| row.get(0),
        )?;
        Ok(max.map(from_sql_timestamp).unwrap_or(0))
    }

    /// Every address with a balance row or a stream in `token`.
    pub fn token_holders(&self, token: &Address) -> Result<Vec<Address>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT from_address FROM stream WHERE token_address = ?1
             UNION
             SELECT to_address FROM stream WHERE token_address = ?1
             UNION
             SELECT account_address FROM balance WHERE token_address = ?1",
        )?;
        let rows = stmt.query_map(params![checksum(token)], |row| row.get::<_, String>(0))?;

        let mut holders = BTreeSet::new();
        for row in rows {
            let text = row?;
            holders.insert(
                text.parse::<Address>()
                    .map_err(|_| DappError::InvalidAddress(text.clone()))?,
            );
        }
        Ok(holders.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn alice() -> Address {
        Address::repeat_byte(0x01)
    }

    fn bob() -> Address {
        Address::repeat_byte(0x02)
    }

    fn new_stream(start: u64, duration: u64, amount: u64) -> NewStream {
        NewStream {
            from: alice(),
            to: bob(),
            start_timestamp: start,
            duration,
            amount: amount::from_u64(amount),
            token: token(),
        }
    }

    #[test]
    fn test_database_open_seeds_roles() {
        let db = Database::open(":memory:").unwrap();
        for role in DappRole::ALL {
            assert_eq!(db.dapp_address(role).unwrap(), Address::ZERO);
        }
    }

    #[test]
    fn test_set_dapp_address() {
        let db = Database::open(":memory:").unwrap();
        db.set_dapp_address(DappRole::YieldBridge, &bob()).unwrap();
        assert_eq!(db.dapp_address(DappRole::YieldBridge).unwrap(), bob());
        assert_eq!(db.dapp_address(DappRole::Admin).unwrap(), Address::ZERO);
    }

    #[test]
    fn test_totals_default_to_zero() {
        let db = Database::open(":memory:").unwrap();
        let totals = db.token_totals(&token()).unwrap();
        assert!(totals.assets.is_zero());
        assert!(totals.shares.is_zero());
        assert!(db.user_shares(&alice(), &token()).unwrap().is_zero());
    }

    #[test]
    fn test_negative_shares_round_trip() {
        let db = Database::open(":memory:").unwrap();
        let negative = amount::from_u64(60).checked_neg().unwrap();
        db.set_user_shares(&alice(), &token(), negative).unwrap();
        assert_eq!(db.user_shares(&alice(), &token()).unwrap(), negative);
    }

    #[test]
    fn test_insert_stream_rejects_end_past_integer_range() {
        let db = Database::open(":memory:").unwrap();
        let err = db.insert_stream(&new_stream(0, u64::MAX, 0)).unwrap_err();
        assert!(matches!(err, DappError::StreamError(_)));
        let err = db.insert_stream(&new_stream(i64::MAX as u64, 1, 0)).unwrap_err();
        assert!(matches!(err, DappError::StreamError(_)));

        db.insert_stream(&new_stream(0, i64::MAX as u64, 0)).unwrap();
        assert_eq!(db.max_end_timestamp(&bob()).unwrap(), i64::MAX as u64);
    }

    #[test]
    fn test_stream_lifecycle() {
        let db = Database::open(":memory:").unwrap();
        let id = db.insert_stream(&new_stream(0, 100, 50)).unwrap();

        let stored = db.stream_by_id(id).unwrap().unwrap();
        assert_eq!(stored.from, alice());
        assert_eq!(stored.amount, amount::from_u64(50));
        assert!(!stored.accrued);

        assert!(db.ended_streams(&alice(), &token(), 99).unwrap().is_empty());
        assert_eq!(db.ended_streams(&bob(), &token(), 100).unwrap().len(), 1);

        db.mark_stream_accrued(id).unwrap();
        assert!(db.ended_streams(&bob(), &token(), 100).unwrap().is_empty());
        assert!(db.stream_by_id(id).unwrap().unwrap().accrued);

        db.update_stream_amount_duration(id, 10, amount::from_u64(5)).unwrap();
        let updated = db.stream_by_id(id).unwrap().unwrap();
        assert_eq!(updated.duration, 10);
        assert_eq!(updated.amount, amount::from_u64(5));

        db.delete_stream(id).unwrap();
        assert!(db.stream_by_id(id).unwrap().is_none());
    }

    #[test]
    fn test_pending_streams_respect_start() {
        let db = Database::open(":memory:").unwrap();
        db.insert_stream(&new_stream(100, 10, 1)).unwrap();
        assert!(db.pending_streams(&alice(), &token(), 99).unwrap().is_empty());
        assert_eq!(db.pending_streams(&alice(), &token(), 100).unwrap().len(), 1);
    }

    #[test]
    fn test_max_end_timestamp() {
        let db = Database::open(":memory:").unwrap();
        assert_eq!(db.max_end_timestamp(&alice()).unwrap(), 0);
        db.insert_stream(&new_stream(100, 10, 1)).unwrap();
        db.insert_stream(&new_stream(50, 500, 1)).unwrap();
        assert_eq!(db.max_end_timestamp(&alice()).unwrap(), 550);
        assert_eq!(db.max_end_timestamp(&bob()).unwrap(), 550);
    }

    #[test]
    fn test_token_holders() {
        let db = Database::open(":memory:").unwrap();
        let carol = Address::repeat_byte(0x03);
        db.set_user_shares(&carol, &token(), amount::from_u64(1)).unwrap();
        db.insert_stream(&new_stream(0, 1, 1)).unwrap();
        let holders = db.token_holders(&token()).unwrap();
        assert_eq!(holders, vec![alice(), bob(), carol]);
    }

    #[test]
    fn test_atomically_rolls_back_on_error() {
        let db = Database::open(":memory:").unwrap();
        let result: Result<()> = db.atomically(|| {
            db.set_dapp_address(DappRole::Admin, &alice())?;
            Err(DappError::Unauthorized("nope".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(db.dapp_address(DappRole::Admin).unwrap(), Address::ZERO);

        db.atomically(|| db.set_dapp_address(DappRole::Admin, &alice()))
            .unwrap();
        assert_eq!(db.dapp_address(DappRole::Admin).unwrap(), alice());
    }

    #[test]
    fn test_reset_discards_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(path).unwrap();
            db.set_dapp_address(DappRole::Admin, &alice()).unwrap();
        }
        {
            let db = Database::open(path).unwrap();
            assert_eq!(db.dapp_address(DappRole::Admin).unwrap(), alice());
        }
        let db = Database::reset(path).unwrap();
        assert_eq!(db.dapp_address(DappRole::Admin).unwrap(), Address::ZERO);
    }
}
