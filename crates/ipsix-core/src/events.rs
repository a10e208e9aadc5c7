//! Engine events
//!
//! The orchestrator and its monitors report what they do on a bounded
//! channel. Consumers are optional: a full or closed channel drops the event
//! and never slows down reconciliation.

use tokio::sync::mpsc;
use tracing::warn;

use crate::address::AddressPrefix;
use crate::reconciler::ReconcileReport;

/// Events emitted by the orchestrator and drift monitors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Orchestrator started
    Started {
        interfaces_count: usize,
    },

    /// One interface finished a reconcile pass
    Reconciled {
        report: ReconcileReport,
    },

    /// A drift monitor began polling
    MonitorStarted {
        interface: String,
    },

    /// An undeclared address was removed
    AddressRemoved {
        interface: String,
        address: AddressPrefix,
    },

    /// An undeclared address could not be removed
    RemovalFailed {
        interface: String,
        address: AddressPrefix,
        error: String,
    },

    /// A poll cycle was skipped because the interface could not be listed
    PollSkipped {
        interface: String,
        reason: String,
    },

    /// A drift monitor exited
    MonitorStopped {
        interface: String,
        /// False when the monitor ended without being asked to
        cancelled: bool,
    },

    /// Orchestrator stopped
    Stopped {
        reason: String,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl EventSink {
    /// Create a sink and its receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an event, dropping it if the channel is full
    pub fn emit(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
