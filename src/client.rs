// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Wallet client seam.
//!
//! The session manager never speaks the wallet protocol itself; it drives
//! an implementation of [`WalletClient`] built by a [`WalletConnector`]
//! against one specific relay. Each call may fail with a transport-class
//! error (drives relay fallback) or an application-class rejection
//! (surfaced to the caller unchanged).
//!
//! Implementations should report a structured [`ClientErrorKind`]. The
//! textual keyword match in [`ClientError::classify_message`] exists only
//! for clients that cannot, and is a known fragility: it mirrors how the
//! original service told the two classes apart.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{CreatedInvoice, PaymentResult, TransactionEntry, WalletInfo};

/// Capability names the remote signer may grant.
pub mod capability {
    pub const GET_INFO: &str = "get_info";
    pub const GET_BALANCE: &str = "get_balance";
    pub const PAY_INVOICE: &str = "pay_invoice";
    pub const MAKE_INVOICE: &str = "make_invoice";
    pub const LIST_TRANSACTIONS: &str = "list_transactions";
    pub const SIGN_MESSAGE: &str = "sign_message";
}

/// How a failed client call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// Relay/socket/timeout failure; the call may succeed on another relay.
    Transport,
    /// The signer understood the request and refused it.
    Rejected,
}

/// Error returned by a wallet client call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    /// Structured classification, when the client can supply one.
    pub kind: Option<ClientErrorKind>,
    pub message: String,
}

/// Message fragments that indicate a transport-class failure.
const TRANSPORT_KEYWORDS: &[&str] = &[
    "connection",
    "network",
    "timeout",
    "timed out",
    "relay",
    "websocket",
    "socket",
    "nostr",
    "reply timeout",
];

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: Some(ClientErrorKind::Transport),
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: Some(ClientErrorKind::Rejected),
            message: message.into(),
        }
    }

    /// Error with no structured kind; classified by message content.
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }

    /// Whether this failure should drive relay fallback.
    ///
    /// Prefers the structured kind; falls back to keyword matching for
    /// clients that only produce text.
    pub fn is_transport(&self) -> bool {
        match self.kind {
            Some(ClientErrorKind::Transport) => true,
            Some(ClientErrorKind::Rejected) => false,
            None => Self::classify_message(&self.message) == ClientErrorKind::Transport,
        }
    }

    /// Last-resort classification by connection-indicative keywords.
    pub fn classify_message(message: &str) -> ClientErrorKind {
        let lowered = message.to_lowercase();
        if TRANSPORT_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            ClientErrorKind::Transport
        } else {
            ClientErrorKind::Rejected
        }
    }
}

/// Result alias for wallet client calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// A live signing/wallet client bound to one relay.
#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Lightweight identity probe; also reports granted capabilities.
    async fn get_info(&self) -> ClientResult<WalletInfo>;

    /// Sign an arbitrary text message, returning the signature.
    async fn sign_message(&self, message: &str) -> ClientResult<String>;

    /// Current balance in millisatoshis.
    async fn get_balance(&self) -> ClientResult<u64>;

    /// Create an invoice for `amount_sats`.
    async fn make_invoice(
        &self,
        amount_sats: u64,
        description: Option<&str>,
        expiry_secs: Option<u64>,
    ) -> ClientResult<CreatedInvoice>;

    /// Wallet transaction history, most recent first.
    async fn list_transactions(&self) -> ClientResult<Vec<TransactionEntry>>;

    /// Pay a bolt11 invoice.
    async fn pay_invoice(&self, invoice: &str) -> ClientResult<PaymentResult>;
}

/// Constructs a [`WalletClient`] from credentials against a specific relay.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &str,
        relay_url: &str,
    ) -> ClientResult<Arc<dyn WalletClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_kind_wins_over_message_content() {
        // The message mentions "balance" only, but the kind is explicit.
        let err = ClientError::transport("balance service unreachable");
        assert!(err.is_transport());

        // A rejection mentioning "relay" stays a rejection.
        let err = ClientError::rejected("relay fee budget exceeded");
        assert!(!err.is_transport());
    }

    #[test]
    fn unclassified_errors_fall_back_to_keywords() {
        assert!(ClientError::unclassified("WebSocket closed unexpectedly").is_transport());
        assert!(ClientError::unclassified("reply timeout waiting for event").is_transport());
        assert!(ClientError::unclassified("nostr relay refused subscription").is_transport());
        assert!(!ClientError::unclassified("insufficient balance").is_transport());
        assert!(!ClientError::unclassified("invoice already paid").is_transport());
    }
}
