// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! # Liveness Probe
//!
//! Background task that periodically checks the wallet connection while the
//! session believes it is connected. A probe failure is handled exactly
//! like an operation exhausting its relay attempts: the session drops to
//! `disconnected` and the reconnection loop takes over.
//!
//! ## Strategy
//!
//! Every `probe_interval` (default 30 s) the probe:
//! 1. Skips the sweep entirely unless the session is `connected`.
//! 2. Issues the same lightweight identity call the connect path uses.
//! 3. Hands transport-class failures to the session's disconnection
//!    handling; application-class refusals are logged and ignored.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`; the session cancels the
//! token on logout.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::WalletSession;

/// Periodic connection liveness checker.
pub struct LivenessProbe {
    session: WalletSession,
    interval: Duration,
}

impl LivenessProbe {
    /// Create a probe for the given session, using its configured interval.
    pub fn new(session: WalletSession) -> Self {
        let interval = session.config().probe_interval;
        Self { session, interval }
    }

    /// Run the probe loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(probe.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Liveness probe starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Liveness probe shutting down");
                    return;
                }
            }

            if shutdown.is_cancelled() {
                info!("Liveness probe shutting down");
                return;
            }

            debug!("Liveness probe sweep");
            self.session.probe_once().await;
        }
    }
}
