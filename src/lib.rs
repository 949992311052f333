// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! TapHub Wallet Session - Lightning wallet connectivity
//!
//! This crate provides the wallet session layer for the TapHub Taproot
//! Assets marketplace: a resilient connection manager over Nostr Wallet
//! Connect style credentials, with relay fallback, reconnection, and
//! offline invoice validation.
//!
//! ## Modules
//!
//! - `session` - Connection lifecycle, relay fallback, operation queue
//! - `client` - Wallet SDK seam (connector/client traits)
//! - `credentials` - NWC connection-string parsing
//! - `invoice` - Offline bolt11 validation
//! - `network` - Network selection (mainnet/testnet4/regtest)
//! - `storage` - Persisted session state
//! - `probe` - Background connection liveness probe

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod invoice;
pub mod models;
pub mod network;
pub mod probe;
pub mod session;
pub mod storage;

pub use client::{ClientError, ClientErrorKind, WalletClient, WalletConnector};
pub use config::SessionConfig;
pub use error::SessionError;
pub use invoice::{validate_invoice, validate_invoice_at};
pub use models::{ConnectionState, InvoiceInfo, WalletInfo, WalletUser};
pub use session::{Subscription, WalletSession};
pub use storage::SessionStore;
