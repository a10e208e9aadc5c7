//! Test doubles and common utilities for contract tests
//!
//! These doubles wrap the in-memory executor so tests can count calls and
//! inject failures without touching a real interface.

#![allow(dead_code)]

use ipsix_core::error::{Error, Result};
use ipsix_core::{
    AddressCommandExecutor, AddressOperation, AddressPrefix, InterfaceDeclaration, MemoryExecutor,
    NormalizedAddress,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// An executor that records every call and can be told to fail
///
/// Cloning shares counters, failure rules and the underlying table.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    inner: MemoryExecutor,
    calls: Arc<Mutex<HashMap<AddressOperation, usize>>>,
    history: Arc<Mutex<Vec<(AddressOperation, Option<NormalizedAddress>)>>>,
    failing: Arc<Mutex<HashSet<(AddressOperation, NormalizedAddress)>>>,
    failing_lists: Arc<AtomicUsize>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing table, for seeding and inspecting state
    pub fn table(&self) -> &MemoryExecutor {
        &self.inner
    }

    /// Make `operation` fail for `addr` until cleared
    pub fn fail(&self, operation: AddressOperation, addr: &str) {
        let addr = ipsix_core::normalize(addr).expect("valid test address");
        self.failing.lock().unwrap().insert((operation, addr));
    }

    /// Remove every failure rule
    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
        self.failing_lists.store(0, Ordering::SeqCst);
    }

    /// Make the next `n` listings fail
    pub fn fail_next_lists(&self, n: usize) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    /// Number of calls made for `operation`
    pub fn calls(&self, operation: AddressOperation) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Every call made, in order, with its address (`None` for listings)
    pub fn history(&self) -> Vec<(AddressOperation, Option<NormalizedAddress>)> {
        self.history.lock().unwrap().clone()
    }

    fn record(&self, operation: AddressOperation, addr: Option<&AddressPrefix>) -> Result<()> {
        *self.calls.lock().unwrap().entry(operation).or_insert(0) += 1;
        self.history
            .lock()
            .unwrap()
            .push((operation, addr.map(|a| a.address)));

        if let Some(addr) = addr
            && self.failing.lock().unwrap().contains(&(operation, addr.address))
        {
            return Err(Error::CommandFailed {
                command: format!("{} {}", operation, addr),
                exit_code: 2,
                output: "RTNETLINK answers: Operation not permitted".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AddressCommandExecutor for RecordingExecutor {
    async fn ensure_present(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        self.record(AddressOperation::EnsurePresent, Some(addr))?;
        self.inner.ensure_present(iface, addr).await
    }

    async fn list_addresses(&self, iface: &str) -> Result<Vec<String>> {
        self.record(AddressOperation::List, None)?;
        let remaining = self.failing_lists.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_lists.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::CommandFailed {
                command: format!("ip -6 addr show dev {}", iface),
                exit_code: 1,
                output: format!("Device \"{}\" does not exist.", iface),
            });
        }
        self.inner.list_addresses(iface).await
    }

    async fn set_preferred_lifetime_zero(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        self.record(AddressOperation::Deprecate, Some(addr))?;
        self.inner.set_preferred_lifetime_zero(iface, addr).await
    }

    async fn set_preferred_lifetime_default(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        self.record(AddressOperation::Prefer, Some(addr))?;
        self.inner.set_preferred_lifetime_default(iface, addr).await
    }

    async fn delete(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        self.record(AddressOperation::Delete, Some(addr))?;
        self.inner.delete(iface, addr).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// An executor whose listing panics, to simulate a monitor dying on its own
pub struct PanickingExecutor;

#[async_trait::async_trait]
impl AddressCommandExecutor for PanickingExecutor {
    async fn ensure_present(&self, _iface: &str, _addr: &AddressPrefix) -> Result<()> {
        Ok(())
    }

    async fn list_addresses(&self, _iface: &str) -> Result<Vec<String>> {
        panic!("listing exploded");
    }

    async fn set_preferred_lifetime_zero(&self, _iface: &str, _addr: &AddressPrefix) -> Result<()> {
        Ok(())
    }

    async fn set_preferred_lifetime_default(&self, _iface: &str, _addr: &AddressPrefix) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _iface: &str, _addr: &AddressPrefix) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "panicking"
    }
}

/// The example declaration: eth0 with fd00::1 (priority) and fd00::2, monitored
pub fn example_declaration() -> InterfaceDeclaration {
    InterfaceDeclaration::new("eth0")
        .with_priority("fd00::1")
        .with_addresses(["fd00::1/64", "fd00::2/64"])
        .with_monitor(true)
}

/// Live addresses of `iface`, sorted
pub async fn live(executor: &MemoryExecutor, iface: &str) -> Vec<String> {
    let mut addrs = executor.list_addresses(iface).await.expect("memory listing succeeds");
    addrs.sort();
    addrs
}
