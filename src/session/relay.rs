// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Relay bookkeeping.
//!
//! The session reaches the wallet-signing service through one of several
//! interchangeable relay endpoints. The pool tracks per-relay health and a
//! wrapping "current" index that selects which relay an operation tries
//! first. Endpoints are parsed once per connect and never removed, only
//! marked failed or active. The index is best-effort load distribution,
//! not a lock: concurrent operations may advance it under each other.

use std::time::Instant;

/// One relay endpoint and its recent health.
#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub url: String,
    /// Whether the most recent attempt against this relay succeeded.
    pub is_active: bool,
    /// Time of the last successful call through this relay.
    pub last_connected_at: Option<Instant>,
    /// Consecutive-ish failure tally; decays by one per success.
    pub failure_count: u32,
}

impl RelayEndpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            is_active: false,
            last_connected_at: None,
            failure_count: 0,
        }
    }
}

/// Ordered relay endpoints plus the wrapping current index.
#[derive(Debug)]
pub struct RelayPool {
    relays: Vec<RelayEndpoint>,
    current: usize,
}

impl RelayPool {
    /// Build a pool from parsed relay URLs. `urls` is never empty: the
    /// credential parser substitutes the default relay.
    pub fn new(urls: Vec<String>) -> Self {
        debug_assert!(!urls.is_empty());
        Self {
            relays: urls.into_iter().map(RelayEndpoint::new).collect(),
            current: 0,
        }
    }

    /// Index of the relay the next attempt should use.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// URL of the current relay.
    pub fn current_url(&self) -> &str {
        &self.relays[self.current].url
    }

    /// Snapshot of all endpoints, in credential order.
    pub fn endpoints(&self) -> &[RelayEndpoint] {
        &self.relays
    }

    /// Record a failure on the current relay and advance to the next one,
    /// wrapping at the end of the list.
    pub fn mark_failed(&mut self) {
        let relay = &mut self.relays[self.current];
        relay.is_active = false;
        relay.failure_count = relay.failure_count.saturating_add(1);
        self.current = (self.current + 1) % self.relays.len();
    }

    /// Record a success on the current relay: decay the failure count,
    /// mark it active, stamp the success time.
    pub fn mark_connected(&mut self) {
        let relay = &mut self.relays[self.current];
        relay.is_active = true;
        relay.failure_count = relay.failure_count.saturating_sub(1);
        relay.last_connected_at = Some(Instant::now());
    }

    /// Attempts an operation may make before giving up: bounded by both
    /// the configured retry cap and the number of known relays.
    pub fn attempt_budget(&self, max_relay_retries: u32) -> u32 {
        (self.relays.len() as u32).min(max_relay_retries).max(1)
    }
}
