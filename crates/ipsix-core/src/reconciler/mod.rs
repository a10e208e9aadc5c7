//! Per-interface reconciliation
//!
//! The Reconciler drives one interface toward its declared state in three
//! strictly ordered passes:
//!
//! ```text
//!   declared addresses ──► 1. ensure present   (every declared address)
//!                          2. deprecate        (everything but the priority address)
//!                          3. prefer           (the priority address)
//! ```
//!
//! Every address is handled independently. A failure is logged, recorded in
//! the [`ReconcileReport`] and processing moves on to the next address; a
//! reconcile pass itself never fails.
//!
//! Re-running a pass converges to the same end state, so the orchestrator
//! can call it as often as it likes.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::{AddressPrefix, NormalizedAddress, normalize};
use crate::config::{DeprecationSource, EngineConfig, InterfaceDeclaration};
use crate::traits::{AddressCommandExecutor, AddressOperation};

/// Prefix length assumed for live addresses reported without one
const HOST_PREFIX_LEN: u8 = 128;

/// One address operation that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFailure {
    /// The address as written in configuration or reported by the interface
    pub address: String,
    /// The operation that failed
    pub operation: AddressOperation,
    /// Diagnostic text
    pub error: String,
}

impl AddressFailure {
    fn new(address: impl Into<String>, operation: AddressOperation, error: impl ToString) -> Self {
        Self {
            address: address.into(),
            operation,
            error: error.to_string(),
        }
    }
}

/// What a single reconcile pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Interface name
    pub interface: String,
    /// Addresses confirmed present
    pub ensured: Vec<NormalizedAddress>,
    /// Addresses marked deprecated
    pub deprecated: Vec<NormalizedAddress>,
    /// Priority address restored to preferred, if any
    pub preferred: Option<NormalizedAddress>,
    /// Per-address failures, in the order they happened
    pub failures: Vec<AddressFailure>,
}

impl ReconcileReport {
    /// True when no address operation failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies an [`InterfaceDeclaration`] through an executor
#[derive(Clone)]
pub struct Reconciler {
    executor: Arc<dyn AddressCommandExecutor>,
    default_prefix_len: u8,
    deprecation_source: DeprecationSource,
}

impl Reconciler {
    /// Create a reconciler using the engine's prefix and deprecation settings
    pub fn new(executor: Arc<dyn AddressCommandExecutor>, engine: &EngineConfig) -> Self {
        Self {
            executor,
            default_prefix_len: engine.default_prefix_len,
            deprecation_source: engine.deprecation_source,
        }
    }

    /// Reconcile one interface
    ///
    /// A malformed priority address is reported as a `prefer` failure and
    /// otherwise treated as absent: every declared address is deprecated.
    pub async fn reconcile(&self, decl: &InterfaceDeclaration) -> ReconcileReport {
        let iface = decl.name.as_str();
        let mut report = ReconcileReport {
            interface: decl.name.clone(),
            ..Default::default()
        };

        info!("Reconciling interface {} ({} declared address(es))", iface, decl.addresses.len());

        let declared = self.parse_declared(decl, &mut report);

        let priority = match decl.priority().map(|raw| (raw, normalize(raw))) {
            None => None,
            Some((_, Ok(addr))) => Some(addr),
            Some((raw, Err(e))) => {
                warn!("Invalid priority address on {}: {}; no address will stay preferred", iface, e);
                report
                    .failures
                    .push(AddressFailure::new(raw, AddressOperation::Prefer, &e));
                None
            }
        };
        let mut missing = HashSet::new();

        // Pass 1: every declared address must exist before preference matters
        for addr in &declared {
            match self.executor.ensure_present(iface, addr).await {
                Ok(()) => {
                    info!(interface = %iface, address = %addr, "Ensured address is present");
                    report.ensured.push(addr.address);
                }
                Err(e) => {
                    warn!(interface = %iface, address = %addr, error = %e, "Failed to add address");
                    report.failures.push(AddressFailure::new(
                        addr.to_string(),
                        AddressOperation::EnsurePresent,
                        &e,
                    ));
                    missing.insert(addr.address);
                }
            }
        }

        // Pass 2
        for addr in self.deprecation_targets(iface, &declared, &mut report).await {
            if Some(addr.address) == priority {
                debug!("Skipping deprecation for priority address {} on {}", addr, iface);
                continue;
            }
            if missing.contains(&addr.address) {
                debug!("Skipping deprecation for {} on {}: it could not be added", addr, iface);
                continue;
            }
            match self.executor.set_preferred_lifetime_zero(iface, &addr).await {
                Ok(()) => {
                    info!(interface = %iface, address = %addr, "Deprecated address");
                    report.deprecated.push(addr.address);
                }
                Err(e) => {
                    warn!(interface = %iface, address = %addr, error = %e, "Failed to deprecate address");
                    report.failures.push(AddressFailure::new(
                        addr.to_string(),
                        AddressOperation::Deprecate,
                        &e,
                    ));
                }
            }
        }

        // Pass 3
        if let Some(addr) = priority {
            let target = self.priority_prefix(decl, addr, &declared);
            if !declared.iter().any(|p| p.address == addr) {
                warn!("Priority address {} is not among the declared addresses of {}", addr, iface);
            }
            match self.executor.set_preferred_lifetime_default(iface, &target).await {
                Ok(()) => {
                    info!(interface = %iface, address = %target, "Restored priority address to preferred");
                    report.preferred = Some(addr);
                }
                Err(e) => {
                    warn!(interface = %iface, address = %target, error = %e, "Failed to prefer priority address");
                    report.failures.push(AddressFailure::new(
                        target.to_string(),
                        AddressOperation::Prefer,
                        &e,
                    ));
                }
            }
        }

        if report.is_clean() {
            info!("Finished reconciling {}", iface);
        } else {
            warn!("Finished reconciling {} with {} failure(s)", iface, report.failures.len());
        }

        report
    }

    /// Parse declared addresses, dropping malformed and duplicate entries
    fn parse_declared(
        &self,
        decl: &InterfaceDeclaration,
        report: &mut ReconcileReport,
    ) -> Vec<AddressPrefix> {
        let mut declared: Vec<AddressPrefix> = Vec::with_capacity(decl.addresses.len());
        for raw in &decl.addresses {
            match AddressPrefix::parse(raw, self.default_prefix_len) {
                Ok(addr) if declared.iter().any(|d| d.address == addr.address) => {
                    debug!("Duplicate declared address {} on {}", raw, decl.name);
                }
                Ok(addr) => declared.push(addr),
                Err(e) => {
                    warn!("Skipping invalid address in configuration for {}: {}", decl.name, e);
                    report
                        .failures
                        .push(AddressFailure::new(raw.as_str(), AddressOperation::EnsurePresent, &e));
                }
            }
        }
        declared
    }

    async fn deprecation_targets(
        &self,
        iface: &str,
        declared: &[AddressPrefix],
        report: &mut ReconcileReport,
    ) -> Vec<AddressPrefix> {
        match self.deprecation_source {
            DeprecationSource::Declared => declared.to_vec(),
            DeprecationSource::Live => match self.executor.list_addresses(iface).await {
                Ok(live) => live
                    .iter()
                    .filter_map(|raw| match AddressPrefix::parse(raw, HOST_PREFIX_LEN) {
                        Ok(addr) => Some(addr),
                        Err(e) => {
                            warn!("Ignoring unparsable live address on {}: {}", iface, e);
                            None
                        }
                    })
                    .collect(),
                Err(e) => {
                    warn!("Failed to list addresses on {}, skipping deprecation: {}", iface, e);
                    report
                        .failures
                        .push(AddressFailure::new(iface, AddressOperation::List, &e));
                    Vec::new()
                }
            },
        }
    }

    /// The prefix to use for the priority address: its declared form if
    /// there is one, otherwise its own suffix or the default length
    fn priority_prefix(
        &self,
        decl: &InterfaceDeclaration,
        addr: NormalizedAddress,
        declared: &[AddressPrefix],
    ) -> AddressPrefix {
        declared
            .iter()
            .find(|p| p.address == addr)
            .copied()
            .or_else(|| {
                decl.priority()
                    .and_then(|raw| AddressPrefix::parse(raw, self.default_prefix_len).ok())
            })
            .unwrap_or(AddressPrefix {
                address: addr,
                prefix_len: self.default_prefix_len,
            })
    }
}
