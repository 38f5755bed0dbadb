//! Error types for YieldStream

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DappError {
    InvalidInput(String),
    InvalidAddress(String),
    InvalidAmount(String),
    Unauthorized(String),
    UnknownMethod(String),
    InsufficientFunds(String),
    StreamError(String),
    ArithmeticOverflow,
    DatabaseError(String),
    RollupError(String),
    RpcError(String),
    TransactionReverted(String),
    GraphQlError(String),
    ArtifactError(String),
    ConfigError(String),
    IoError(String),
    SerializationError(String),
}

impl fmt::Display for DappError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DappError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            DappError::InvalidAddress(addr) => write!(f, "Invalid address {}", addr),
            DappError::InvalidAmount(msg) => write!(f, "{}", msg),
            DappError::Unauthorized(msg) => write!(f, "{}", msg),
            DappError::UnknownMethod(method) => write!(f, "Unknown method {}", method),
            DappError::InsufficientFunds(msg) => write!(f, "{}", msg),
            DappError::StreamError(msg) => write!(f, "{}", msg),
            DappError::ArithmeticOverflow => write!(f, "Arithmetic overflow"),
            DappError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            DappError::RollupError(msg) => write!(f, "Rollup server error: {}", msg),
            DappError::RpcError(msg) => write!(f, "RPC error: {}", msg),
            DappError::TransactionReverted(hash) => write!(f, "Transaction reverted: {}", hash),
            DappError::GraphQlError(msg) => write!(f, "GraphQL error: {}", msg),
            DappError::ArtifactError(msg) => write!(f, "Artifact error: {}", msg),
            DappError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            DappError::IoError(msg) => write!(f, "IO error: {}", msg),
            DappError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for DappError {}

impl From<std::io::Error> for DappError {
    fn from(err: std::io::Error) -> Self {
        DappError::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for DappError {
    fn from(err: rusqlite::Error) -> Self {
        DappError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DappError {
    fn from(err: serde_json::Error) -> Self {
        DappError::SerializationError(err.to_string())
    }
}

impl From<hex::FromHexError> for DappError {
    fn from(err: hex::FromHexError) -> Self {
        DappError::InvalidInput(format!("bad hex: {}", err))
    }
}

impl From<alloy_sol_types::Error> for DappError {
    fn from(err: alloy_sol_types::Error) -> Self {
        DappError::InvalidInput(format!("ABI decoding failed: {}", err))
    }
}

impl From<reqwest::Error> for DappError {
    fn from(err: reqwest::Error) -> Self {
        DappError::RpcError(err.to_string())
    }
}

impl From<alloy::transports::TransportError> for DappError {
    fn from(err: alloy::transports::TransportError) -> Self {
        DappError::RpcError(err.to_string())
    }
}

impl From<toml::de::Error> for DappError {
    fn from(err: toml::de::Error) -> Self {
        DappError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, DappError>;
