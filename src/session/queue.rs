// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 TapHub

//! Deferred operations.
//!
//! Calls issued while the session is disconnected are parked here and
//! replayed in insertion order once connectivity returns. Each entry keeps
//! the caller's completion handle, so the original future resolves (or
//! rejects) when the queue drains. Logout rejects every entry at once.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::SessionError;
use crate::models::{PaymentResult, WalletInfo};

/// What a queued operation will do once a client is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedRequest {
    /// Pay a bolt11 invoice. Payments always queue; dropping one silently
    /// is never acceptable.
    Payment { invoice: String },
    /// Balance read.
    Balance,
    /// Wallet info read.
    Info,
}

/// Kind tag for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Payment,
    Balance,
    Info,
}

impl QueuedRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            QueuedRequest::Payment { .. } => OperationKind::Payment,
            QueuedRequest::Balance => OperationKind::Balance,
            QueuedRequest::Info => OperationKind::Info,
        }
    }
}

/// Output of a drained operation, matched back by the caller.
#[derive(Debug)]
pub enum QueuedOutput {
    Payment(PaymentResult),
    Balance(u64),
    Info(WalletInfo),
}

/// One deferred call: identifier, the deferred action, and the completion
/// handle pair (resolve/reject travel through the same oneshot).
#[derive(Debug)]
pub struct QueuedOperation {
    pub id: Uuid,
    pub request: QueuedRequest,
    pub completion: oneshot::Sender<Result<QueuedOutput, SessionError>>,
}

/// Strictly FIFO queue of deferred operations.
#[derive(Debug, Default)]
pub struct OperationQueue {
    entries: VecDeque<QueuedOperation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Park a request; the caller holds the matching receiver.
    pub fn push(
        &mut self,
        request: QueuedRequest,
    ) -> oneshot::Receiver<Result<QueuedOutput, SessionError>> {
        let (tx, rx) = oneshot::channel();
        let op = QueuedOperation {
            id: Uuid::new_v4(),
            request,
            completion: tx,
        };
        tracing::debug!(id = %op.id, kind = ?op.request.kind(), "Queued operation while disconnected");
        self.entries.push_back(op);
        rx
    }

    /// Take every entry, oldest first, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<QueuedOperation> {
        self.entries.drain(..).collect()
    }

    /// Reject every queued entry with a cancellation error and clear the
    /// queue. Used on logout.
    pub fn reject_all(&mut self) {
        for op in self.entries.drain(..) {
            tracing::debug!(id = %op.id, kind = ?op.request.kind(), "Rejecting queued operation");
            // The caller may have given up on the receiver already.
            let _ = op.completion.send(Err(SessionError::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_in_insertion_order() {
        let mut queue = OperationQueue::new();
        let _rx1 = queue.push(QueuedRequest::Payment {
            invoice: "lnbc1first".to_string(),
        });
        let _rx2 = queue.push(QueuedRequest::Balance);
        let _rx3 = queue.push(QueuedRequest::Payment {
            invoice: "lnbc1second".to_string(),
        });

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert!(queue.is_empty());
        assert_eq!(
            drained[0].request,
            QueuedRequest::Payment {
                invoice: "lnbc1first".to_string()
            }
        );
        assert_eq!(drained[1].request, QueuedRequest::Balance);
        assert_eq!(
            drained[2].request,
            QueuedRequest::Payment {
                invoice: "lnbc1second".to_string()
            }
        );
    }

    #[tokio::test]
    async fn reject_all_cancels_every_waiter() {
        let mut queue = OperationQueue::new();
        let rx1 = queue.push(QueuedRequest::Balance);
        let rx2 = queue.push(QueuedRequest::Info);

        queue.reject_all();
        assert!(queue.is_empty());

        for rx in [rx1, rx2] {
            match rx.await {
                Ok(Err(SessionError::Cancelled)) => {}
                other => panic!("expected cancellation, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn reject_all_tolerates_dropped_receivers() {
        let mut queue = OperationQueue::new();
        drop(queue.push(QueuedRequest::Balance));
        queue.reject_all();
        assert!(queue.is_empty());
    }
}
