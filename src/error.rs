// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Session error taxonomy.
//!
//! Callers branch on the variant to decide between "retry", "reconnect",
//! and a permission-upgrade prompt:
//!
//! - [`SessionError::NotInitialized`] / [`SessionError::MissingPermission`]
//!   are fatal to the call and never retried internally.
//! - [`SessionError::Connection`] drives relay fallback and, when all
//!   relays are exhausted, the reconnection state machine.
//! - [`SessionError::Rejected`] is an application-level refusal from the
//!   remote signer (e.g. insufficient balance) and never triggers fallback.
//! - [`SessionError::Cancelled`] is delivered to queued operations that are
//!   discarded on logout.

use crate::storage::StorageError;

/// Errors surfaced by the wallet session manager.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Operation invoked before any successful connect.
    #[error("wallet session is not initialized; connect first")]
    NotInitialized,

    /// The remote signer did not grant the required capability.
    #[error("missing permission '{0}'; reconnect with a broader scope to grant it")]
    MissingPermission(String),

    /// Relay/transport/timeout failure. Retried across relays before being
    /// surfaced.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote signer explicitly rejected the request.
    #[error("wallet rejected the request: {0}")]
    Rejected(String),

    /// Queued operation discarded on logout.
    #[error("operation cancelled: session was logged out")]
    Cancelled,

    /// The supplied connection string could not be used.
    #[error("invalid wallet credentials: {0}")]
    Credentials(String),

    /// Persisted session state could not be read or written.
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Whether this failure is connection-class, i.e. should drive relay
    /// fallback and reconnection rather than being final.
    pub fn is_connection_class(&self) -> bool {
        matches!(self, SessionError::Connection(_))
    }
}
