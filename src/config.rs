// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! # Session Tuning Constants
//!
//! Defaults for relay retry, reconnection backoff, and the liveness probe.
//! All values can be overridden per session through [`SessionConfig`].
//!
//! | Setting | Description | Default |
//! |---------|-------------|---------|
//! | `max_relay_retries` | Relay attempts per operation (also bounded by relay count) | `3` |
//! | `attempt_timeout` | Upper bound on a single relay attempt | `10 s` |
//! | `relay_retry_delay` | Fixed pause before switching to the next relay | `1 s` |
//! | `max_reconnect_attempts` | Automatic reconnection attempts after a disconnect | `5` |
//! | `reconnect_base_delay` | First reconnection backoff step (doubles per attempt) | `1 s` |
//! | `reconnect_max_delay` | Cap on the reconnection backoff | `30 s` |
//! | `probe_interval` | Liveness probe period while connected | `30 s` |

use std::time::Duration;

/// Relay used when the credential string names none.
pub const DEFAULT_RELAY_URL: &str = "wss://relay.getalby.com/v1";

/// Maximum relay attempts per operation, before bounding by relay count.
pub const DEFAULT_MAX_RELAY_RETRIES: u32 = 3;

/// Upper bound on one relay attempt (connect, probe, or operation call).
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed pause between relay attempts within one operation.
pub const DEFAULT_RELAY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Automatic reconnection attempts after entering the disconnected state.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// First reconnection backoff delay; doubles on each failed attempt.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Cap applied to the exponential reconnection backoff.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Interval between liveness probes while connected.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Tuning knobs for a [`crate::session::WalletSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay attempts per operation; effective bound is
    /// `min(max_relay_retries, relay count)`.
    pub max_relay_retries: u32,
    /// Upper bound on a single relay attempt.
    pub attempt_timeout: Duration,
    /// Fixed pause before retrying against the next relay.
    pub relay_retry_delay: Duration,
    /// Automatic reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// First reconnection backoff step.
    pub reconnect_base_delay: Duration,
    /// Cap on the reconnection backoff.
    pub reconnect_max_delay: Duration,
    /// Liveness probe period.
    pub probe_interval: Duration,
    /// Relay used when the credentials specify none.
    pub default_relay: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_relay_retries: DEFAULT_MAX_RELAY_RETRIES,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            relay_retry_delay: DEFAULT_RELAY_RETRY_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            default_relay: DEFAULT_RELAY_URL.to_string(),
        }
    }
}

impl SessionConfig {
    /// Reconnection backoff for a 1-based attempt number: the base delay
    /// doubled per attempt, capped at `reconnect_max_delay`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.reconnect_base_delay.saturating_mul(1u32 << shift);
        delay.min(self.reconnect_max_delay)
    }
}
