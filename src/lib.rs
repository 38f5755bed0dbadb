//! YieldStream - native-yield streaming tokens on a Cartesi-style rollup
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger
//! - [`amount`] - Signed 256-bit amounts and share/asset conversions
//! - [`stream`] - Linear token streams
//! - [`token`] - Stream-rebase token over the database
//! - [`persistence`] - Database layer (SQLite)
//!
//! ## Dapp
//! - [`codec`] - Hex and ABI envelopes of rollup inputs
//! - [`action`] - JSON actions carried by inputs
//! - [`handlers`] - Advance and inspect handlers
//! - [`rollup`] - Rollup HTTP server protocol and `/finish` loop
//!
//! ## Driver
//! - [`client`] - JSON-RPC, artifacts, contract calls, GraphQL and inspect clients
//! - [`scenario`] - Scripted lending-market demo
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod amount;
pub mod persistence;
pub mod stream;
pub mod token;

// ============================================================================
// Dapp
// ============================================================================
pub mod action;
pub mod codec;
pub mod handlers;
pub mod rollup;

// ============================================================================
// Driver
// ============================================================================
pub mod client;
pub mod scenario;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod logging;
