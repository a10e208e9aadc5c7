//! Orchestrator
//!
//! The Orchestrator is responsible for:
//! - Reconciling every declared interface once at startup
//! - Spawning one drift monitor per interface that asks for monitoring
//! - Keeping the monitors alive until shutdown
//! - Logging (never restarting) monitors that exit on their own
//!
//! ## Architecture
//!
//! ```text
//!                   ┌──────────────┐
//!   declarations ──►│ Orchestrator │── EngineEvent ──► (optional consumer)
//!                   └──────────────┘
//!                     │         │
//!          reconcile  │         │  spawn (monitor_ipv6 only)
//!                     ▼         ▼
//!             ┌────────────┐  ┌──────────────┐
//!             │ Reconciler │  │ DriftMonitor │ × N
//!             └────────────┘  └──────────────┘
//!                     │         │
//!                     ▼         ▼
//!             ┌────────────────────────────┐
//!             │  AddressCommandExecutor    │
//!             └────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{InterfaceDeclaration, IpsixConfig};
use crate::error::Result;
use crate::events::{EngineEvent, EventSink};
use crate::monitor::{DriftMonitor, MonitorExit, MonitorSet};
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::traits::AddressCommandExecutor;

/// Top-level driver for all declared interfaces
///
/// ## Lifecycle
///
/// 1. Create with [`Orchestrator::new()`]
/// 2. Start with [`Orchestrator::run()`] (Ctrl-C stops it) or
///    [`Orchestrator::run_with_shutdown()`]
/// 3. Every interface is reconciled, then monitors run until shutdown
/// 4. On shutdown all monitors are cancelled and joined
///
/// ## Concurrency
///
/// Each monitor owns a copy of its declaration and touches only its own
/// interface; nothing mutable is shared between tasks.
pub struct Orchestrator {
    executor: Arc<dyn AddressCommandExecutor>,
    interfaces: Vec<InterfaceDeclaration>,
    reconciler: Reconciler,
    poll_interval: Duration,
    events: EventSink,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver) where event_receiver yields engine events
    pub fn new(
        executor: Arc<dyn AddressCommandExecutor>,
        config: IpsixConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (events, rx) = EventSink::channel(config.engine.event_channel_capacity);
        let reconciler = Reconciler::new(Arc::clone(&executor), &config.engine);

        let orchestrator = Self {
            executor,
            interfaces: config.interfaces,
            reconciler,
            poll_interval: config.engine.poll_interval(),
            events,
        };

        Ok((orchestrator, rx))
    }

    /// Declared interfaces, in configuration order
    pub fn interfaces(&self) -> &[InterfaceDeclaration] {
        &self.interfaces
    }

    /// Reconcile every declared interface once
    ///
    /// Failures are contained per address and reported, never returned.
    pub async fn reconcile_all(&self) -> Vec<ReconcileReport> {
        let mut reports = Vec::with_capacity(self.interfaces.len());
        for decl in &self.interfaces {
            let report = self.reconciler.reconcile(decl).await;
            self.events.emit(EngineEvent::Reconciled {
                report: report.clone(),
            });
            reports.push(report);
        }
        reports
    }

    /// Spawn a drift monitor for every interface with `monitor_ipv6` set
    ///
    /// Monitors are children of `shutdown`.
    pub fn spawn_monitors(&self, shutdown: &CancellationToken) -> MonitorSet {
        let mut monitors = MonitorSet::new();
        for decl in self.interfaces.iter().filter(|d| d.monitor_ipv6) {
            let monitor = DriftMonitor::new(decl.clone(), Arc::clone(&self.executor), self.poll_interval)
                .with_events(self.events.clone());
            monitors.spawn(monitor, shutdown);
        }
        monitors
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let run = self.run_with_shutdown(shutdown.clone());
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("Shutdown signal received");
                    shutdown.cancel();
                }
                Err(e) => warn!("Cannot listen for Ctrl-C, running without it: {}", e),
            },
        }

        run.await
    }

    /// Run until `shutdown` is cancelled
    ///
    /// With no monitored interface this still waits for `shutdown`, matching
    /// a daemon that stays up after applying its configuration.
    pub async fn run_with_shutdown(&self, shutdown: CancellationToken) -> Result<()> {
        self.events.emit(EngineEvent::Started {
            interfaces_count: self.interfaces.len(),
        });

        let reports = self.reconcile_all().await;
        let failures: usize = reports.iter().map(|r| r.failures.len()).sum();
        info!(
            "Configuration applied to {} interface(s), {} failure(s)",
            reports.len(),
            failures
        );

        let mut monitors = self.spawn_monitors(&shutdown);
        info!("{} drift monitor(s) running", monitors.len());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                Some(exit) = monitors.next_exit(), if !monitors.is_empty() => {
                    self.report_exit(exit);
                }
            }
        }

        for exit in monitors.shutdown().await {
            self.report_exit(exit);
        }

        self.events.emit(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("All monitors stopped");

        Ok(())
    }

    fn report_exit(&self, exit: MonitorExit) {
        if exit.cancelled {
            info!("Monitor for {} stopped", exit.interface);
        } else {
            error!("Monitor for {} exited unexpectedly; it will not be restarted", exit.interface);
        }
        self.events.emit(EngineEvent::MonitorStopped {
            interface: exit.interface,
            cancelled: exit.cancelled,
        });
    }
}
