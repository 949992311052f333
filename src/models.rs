// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Shared data types for the wallet session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection lifecycle of a wallet session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// A working client is established and the liveness probe passes.
    Connected,
    /// Connect or reconnect in progress.
    Connecting,
    /// No working client; operations queue or fail fast.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Kind of account behind the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Regular wallet user.
    User,
    /// Node runner offering assets on the marketplace.
    Node,
}

/// Identity of the connected wallet user, persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletUser {
    /// Account kind
    #[serde(rename = "type")]
    pub user_type: UserType,
    /// Wallet service pubkey extracted from the credentials
    pub pubkey: String,
    /// Human-readable alias, best-effort
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Contact email, if the user provided one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether this user runs a marketplace node
    #[serde(default)]
    pub is_node_runner: bool,
    /// Free-form node description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Input for upgrading a session user to a node runner.
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    pub pubkey: String,
    pub alias: String,
    pub description: Option<String>,
}

/// Identity and capability report from the remote signer.
#[derive(Debug, Clone, Default)]
pub struct WalletInfo {
    /// Signer alias, if advertised
    pub alias: Option<String>,
    /// Signer node pubkey, if advertised
    pub pubkey: Option<String>,
    /// Network the signer operates on (e.g. "regtest")
    pub network: Option<String>,
    /// Capability names this session may invoke
    pub methods: Vec<String>,
}

/// Result of a settled outgoing payment.
#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub payment_hash: Option<String>,
    pub preimage: Option<String>,
    pub fees_paid_msat: Option<u64>,
}

/// A freshly created invoice.
#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    /// bolt11 text encoding
    pub invoice: String,
    pub payment_hash: String,
}

/// Direction of a wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDirection {
    Incoming,
    Outgoing,
}

/// One entry from the wallet transaction history.
#[derive(Debug, Clone)]
pub struct TransactionEntry {
    pub direction: TxDirection,
    pub amount_msat: u64,
    pub description: Option<String>,
    /// Settlement time; `None` while pending
    pub settled_at: Option<DateTime<Utc>>,
}

/// Structured result of offline invoice validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceInfo {
    pub valid: bool,
    pub expired: bool,
    pub amount_msat: Option<u64>,
    pub description: Option<String>,
    pub error_message: Option<String>,
}

/// Render a millisatoshi balance as a whole-sat display string.
pub fn format_balance_msat(balance_msat: u64) -> String {
    let sats = balance_msat / 1_000;
    let digits = sats.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{grouped} sats")
}
