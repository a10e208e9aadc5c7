//! Drift monitoring
//!
//! A [`DriftMonitor`] keeps one interface's live address set equal to its
//! declared allow-set. It has a single state, polling:
//!
//! ```text
//!   ┌──────────────┐  every poll interval   ┌─────────────────────┐
//!   │   waiting    │ ─────────────────────► │ list → diff → delete │
//!   └──────────────┘ ◄───────────────────── └─────────────────────┘
//!          │                cycle done
//!          ▼ cancellation token
//!        exit
//! ```
//!
//! Only membership is corrected. Preference state of allowed addresses is
//! left to the reconciler.
//!
//! [`MonitorSet`] owns the spawned monitor tasks, one cancellation token per
//! interface, and reports every task exit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::address::{AddressPrefix, NormalizedAddress, normalize};
use crate::config::InterfaceDeclaration;
use crate::events::{EngineEvent, EventSink};
use crate::reconciler::AddressFailure;
use crate::traits::{AddressCommandExecutor, AddressOperation};

/// Prefix length assumed for live addresses reported without one
const HOST_PREFIX_LEN: u8 = 128;

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The interface could not be listed; nothing was changed
    Skipped {
        /// Why the listing failed
        reason: String,
    },

    /// The cycle ran to completion
    Completed {
        /// Undeclared addresses that were deleted
        removed: Vec<AddressPrefix>,
        /// Undeclared addresses that could not be deleted
        failed: Vec<AddressFailure>,
        /// Live addresses that belong to the allow-set
        retained: usize,
    },
}

/// Polls one interface and deletes addresses outside its declaration
pub struct DriftMonitor {
    declaration: InterfaceDeclaration,
    executor: Arc<dyn AddressCommandExecutor>,
    poll_interval: Duration,
    events: Option<EventSink>,
}

impl DriftMonitor {
    /// Create a monitor for `declaration`
    ///
    /// `poll_interval` must be non-zero.
    pub fn new(
        declaration: InterfaceDeclaration,
        executor: Arc<dyn AddressCommandExecutor>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            declaration,
            executor,
            poll_interval,
            events: None,
        }
    }

    /// Report removals and skipped cycles on `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    /// Interface this monitor watches
    pub fn interface(&self) -> &str {
        &self.declaration.name
    }

    /// Normalized declared addresses
    ///
    /// Rebuilt every cycle from the immutable declaration.
    fn allow_set(&self) -> HashSet<NormalizedAddress> {
        self.declaration
            .addresses
            .iter()
            .filter_map(|raw| match normalize(raw) {
                Ok(addr) => Some(addr),
                Err(e) => {
                    debug!("Declared address ignored by monitor on {}: {}", self.declaration.name, e);
                    None
                }
            })
            .collect()
    }

    /// Run a single poll cycle
    pub async fn poll_once(&self) -> PollOutcome {
        let iface = self.declaration.name.as_str();

        let live = match self.executor.list_addresses(iface).await {
            Ok(live) => live,
            Err(e) => {
                warn!("Failed to list IPv6 addresses on {}: {}", iface, e);
                self.emit(EngineEvent::PollSkipped {
                    interface: iface.to_string(),
                    reason: e.to_string(),
                });
                return PollOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let allowed = self.allow_set();
        let mut removed = Vec::new();
        let mut failed = Vec::new();
        let mut retained = 0;

        for raw in &live {
            let addr = match AddressPrefix::parse(raw, HOST_PREFIX_LEN) {
                Ok(addr) => addr,
                Err(e) => {
                    warn!("Ignoring unparsable live address on {}: {}", iface, e);
                    continue;
                }
            };

            if allowed.contains(&addr.address) {
                retained += 1;
                continue;
            }

            info!("Unauthorized IPv6 address detected on {}: {}. Removing", iface, addr);
            match self.executor.delete(iface, &addr).await {
                Ok(()) => {
                    info!(interface = %iface, address = %addr, "Removed unauthorized address");
                    self.emit(EngineEvent::AddressRemoved {
                        interface: iface.to_string(),
                        address: addr,
                    });
                    removed.push(addr);
                }
                Err(e) => {
                    warn!(interface = %iface, address = %addr, error = %e, "Failed to remove address");
                    self.emit(EngineEvent::RemovalFailed {
                        interface: iface.to_string(),
                        address: addr,
                        error: e.to_string(),
                    });
                    failed.push(AddressFailure {
                        address: addr.to_string(),
                        operation: AddressOperation::Delete,
                        error: e.to_string(),
                    });
                }
            }
        }

        PollOutcome::Completed {
            removed,
            failed,
            retained,
        }
    }

    /// Poll until `shutdown` is cancelled
    ///
    /// The first cycle runs one interval after start. A cycle that outlasts
    /// the interval delays the next one instead of overlapping it.
    pub async fn run(self, shutdown: CancellationToken) {
        let iface = self.declaration.name.clone();
        info!("Starting IPv6 monitoring for interface {} (every {:?})", iface, self.poll_interval);
        self.emit(EngineEvent::MonitorStarted {
            interface: iface.clone(),
        });

        let mut ticker = tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        outcome = self.poll_once() => {
                            if let PollOutcome::Completed { removed, failed, retained } = outcome {
                                debug!(
                                    "Poll on {}: {} retained, {} removed, {} failed",
                                    iface, retained, removed.len(), failed.len()
                                );
                            }
                        }
                    }
                }
            }
        }

        info!("Stopped IPv6 monitoring for interface {}", iface);
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

/// Notification that a monitor task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorExit {
    /// Interface the monitor was watching
    pub interface: String,
    /// True when the exit followed cancellation
    pub cancelled: bool,
}

/// Sends a [`MonitorExit`] when the task finishes, including by panic
struct ExitGuard {
    interface: String,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<MonitorExit>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(MonitorExit {
            interface: std::mem::take(&mut self.interface),
            cancelled: self.token.is_cancelled(),
        });
    }
}

struct MonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// The set of running drift monitors
///
/// Each monitor gets a child of the parent token passed to [`MonitorSet::spawn`],
/// so it can be stopped alone or together with everything else.
pub struct MonitorSet {
    handles: HashMap<String, MonitorHandle>,
    exit_tx: mpsc::UnboundedSender<MonitorExit>,
    exit_rx: mpsc::UnboundedReceiver<MonitorExit>,
}

impl MonitorSet {
    /// Create an empty set
    pub fn new() -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            handles: HashMap::new(),
            exit_tx,
            exit_rx,
        }
    }

    /// Spawn `monitor` on the runtime
    ///
    /// Returns false, dropping `monitor`, if a monitor for the same
    /// interface is still outstanding.
    pub fn spawn(&mut self, monitor: DriftMonitor, parent: &CancellationToken) -> bool {
        let interface = monitor.interface().to_string();
        if self.handles.contains_key(&interface) {
            warn!("Monitor for {} is already running", interface);
            return false;
        }

        let token = parent.child_token();
        let guard = ExitGuard {
            interface: interface.clone(),
            token: token.clone(),
            tx: self.exit_tx.clone(),
        };
        let run_token = token.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            monitor.run(run_token).await;
        });

        self.handles.insert(interface, MonitorHandle { token, task });
        true
    }

    /// Number of monitors whose exit has not been observed yet
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no monitor is outstanding
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Interfaces with an outstanding monitor
    pub fn interfaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Ask the monitor for `interface` to stop
    ///
    /// Returns false if no such monitor is outstanding. The exit is still
    /// reported through [`MonitorSet::next_exit`].
    pub fn stop(&mut self, interface: &str) -> bool {
        match self.handles.get(interface) {
            Some(handle) => {
                handle.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the next monitor to exit
    ///
    /// Returns `None` once every spawned monitor has been accounted for.
    pub async fn next_exit(&mut self) -> Option<MonitorExit> {
        if self.handles.is_empty() {
            return None;
        }
        let exit = self.exit_rx.recv().await?;
        self.handles.remove(&exit.interface);
        Some(exit)
    }

    /// Cancel every monitor and wait for all of them to finish
    pub async fn shutdown(mut self) -> Vec<MonitorExit> {
        for handle in self.handles.values() {
            handle.token.cancel();
        }

        for (interface, handle) in self.handles.drain() {
            if let Err(e) = handle.task.await {
                error!("Monitor task for {} failed: {}", interface, e);
            }
        }

        drop(self.exit_tx);
        let mut exits = Vec::new();
        while let Some(exit) = self.exit_rx.recv().await {
            exits.push(exit);
        }
        exits
    }
}

impl Default for MonitorSet {
    fn default() -> Self {
        Self::new()
    }
}
