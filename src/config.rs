//! Configuration management for YieldStream

use crate::error::{DappError, Result};
use alloy_primitives::{address, Address};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rollup: RollupConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollupConfig {
    #[serde(default = "default_rollup_url")]
    pub url: String,
    /// Pause between `/finish` calls that found nothing to do.
    #[serde(default)]
    pub idle_backoff_ms: u64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            url: default_rollup_url(),
            idle_backoff_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// The rollup replays every input from genesis, so a stale ledger must go.
    #[serde(default = "default_true")]
    pub reset_on_start: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            reset_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    #[serde(default = "default_inspect_url")]
    pub inspect_url: String,
    #[serde(default = "default_input_box")]
    pub input_box: Address,
    #[serde(default = "default_dapp")]
    pub dapp: Address,
    /// Unlocked dev-node account that deploys and owns everything.
    #[serde(default = "default_owner")]
    pub owner: Address,
    /// Unlocked dev-node account that plays the Morpho borrower.
    #[serde(default = "default_borrower")]
    pub borrower: Address,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
    /// Seconds to let the rollup node pick up an input.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub voucher_poll_interval_secs: u64,
    /// 0 polls forever.
    #[serde(default)]
    pub voucher_poll_attempts: u32,
    #[serde(default = "default_receipt_attempts")]
    pub receipt_poll_attempts: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            graphql_url: default_graphql_url(),
            inspect_url: default_inspect_url(),
            input_box: default_input_box(),
            dapp: default_dapp(),
            owner: default_owner(),
            borrower: default_borrower(),
            artifacts_dir: default_artifacts_dir(),
            settle_secs: default_settle_secs(),
            voucher_poll_interval_secs: default_poll_interval(),
            voucher_poll_attempts: 0,
            receipt_poll_attempts: default_receipt_attempts(),
        }
    }
}

/// Load `path` (or `config.toml`), falling back to defaults when the file is
/// absent, then apply the environment overrides.
pub fn load_config(path: Option<&str>) -> Result<Config> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config: Config = if Path::new(path).exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        Config::default()
    };

    if let Ok(url) = std::env::var("ROLLUP_HTTP_SERVER_URL") {
        config.rollup.url = url;
    }
    if let Ok(db_path) = std::env::var("DB_FILE_PATH") {
        config.database.path = db_path;
    }

    // Validate critical values
    if config.database.path.is_empty() {
        return Err(DappError::ConfigError("database.path must be set".to_string()));
    }
    if config.rollup.url.is_empty() {
        return Err(DappError::ConfigError("rollup.url must be set".to_string()));
    }
    if config.demo.voucher_poll_interval_secs == 0 {
        return Err(DappError::ConfigError(
            "demo.voucher_poll_interval_secs must be positive".to_string(),
        ));
    }

    Ok(config)
}

fn default_true() -> bool {
    true
}

fn default_rollup_url() -> String {
    "http://127.0.0.1:5004".to_string()
}

fn default_db_path() -> String {
    "dapp.sqlite".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_graphql_url() -> String {
    "http://localhost:8080/graphql".to_string()
}

fn default_inspect_url() -> String {
    "http://localhost:8080/inspect".to_string()
}

fn default_input_box() -> Address {
    address!("59b22d57d4f067708ab0c00552767405926dc768")
}

fn default_dapp() -> Address {
    address!("ab7528bb862fb57e8a2bcd567a2e929a0be56a5e")
}

// First two anvil/hardhat dev accounts
fn default_owner() -> Address {
    address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266")
}

fn default_borrower() -> Address {
    address!("70997970c51812dc3a010c7d01b50e0d17dc79c8")
}

fn default_artifacts_dir() -> String {
    "contracts/out".to_string()
}

fn default_settle_secs() -> u64 {
    3
}

fn default_poll_interval() -> u64 {
    3
}

fn default_receipt_attempts() -> u32 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_local_devnet() {
        let config = Config::default();
        assert_eq!(config.rollup.url, "http://127.0.0.1:5004");
        assert_eq!(
            config.demo.input_box,
            "0x59b22D57D4f067708AB0c00552767405926dc768".parse::<Address>().unwrap()
        );
        assert_eq!(
            config.demo.dapp,
            "0xab7528bb862fb57e8a2bcd567a2e929a0be56a5e".parse::<Address>().unwrap()
        );
        assert_eq!(
            config.demo.owner,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap()
        );
        assert_eq!(
            config.demo.borrower,
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse::<Address>().unwrap()
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.database.reset_on_start);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\nreset_on_start = false\n\n[logging]\nformat = \"pretty\"\n\n[demo]\nvoucher_poll_attempts = 5"
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert!(!config.database.reset_on_start);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.demo.voucher_poll_attempts, 5);
        assert_eq!(config.demo.rpc_url, "http://localhost:8545");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[demo]\nvoucher_poll_interval_secs = 0").unwrap();
        assert!(matches!(load_config(file.path().to_str()), Err(DappError::ConfigError(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rollup\nurl = ").unwrap();
        assert!(matches!(load_config(file.path().to_str()), Err(DappError::ConfigError(_))));
    }
}
