// # Memory Executor
//
// In-memory implementation of AddressCommandExecutor.
//
// ## Purpose
//
// Simulates per-interface address tables without touching the host. Used
// for dry runs (`executor: {type: memory}`) and as the substrate for tests.
//
// ## Semantics
//
// - Addresses are keyed by address alone; adding an address that already
//   exists (with any prefix length) succeeds without changes.
// - Deprecating, preferring or deleting an absent address fails.
// - Loopback and link-local addresses are carried but never listed.
// - Interfaces spring into existence on first use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::address::{AddressPrefix, NormalizedAddress};
use crate::traits::AddressCommandExecutor;
use crate::Error;

const BACKEND: &str = "memory";

/// Observable state of one address on an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressState {
    /// Not bound to the interface
    Absent,
    /// Bound and eligible as a source address for new connections
    Preferred,
    /// Bound but preferred lifetime is zero
    Deprecated,
}

#[derive(Debug, Clone)]
struct Entry {
    prefix: AddressPrefix,
    preferred: bool,
}

/// In-memory executor implementation
///
/// Cloning shares the underlying table, so a test can keep a handle while
/// the reconciler owns another.
///
/// # Example
///
/// ```rust,no_run
/// use ipsix_core::executor::{AddressState, MemoryExecutor};
/// use ipsix_core::{AddressCommandExecutor, AddressPrefix};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let executor = MemoryExecutor::new();
///     let addr = AddressPrefix::parse("fd00::1/64", 64)?;
///
///     executor.ensure_present("eth0", &addr).await?;
///     executor.set_preferred_lifetime_zero("eth0", &addr).await?;
///
///     assert_eq!(executor.state("eth0", "fd00::1").await, AddressState::Deprecated);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutor {
    inner: Arc<RwLock<HashMap<String, Vec<Entry>>>>,
}

impl MemoryExecutor {
    /// Create an executor with no interfaces
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an address as some external actor would (preferred)
    pub async fn inject(&self, iface: &str, addr: &str) -> Result<(), Error> {
        let prefix = AddressPrefix::parse(addr, 128)?;
        let mut table = self.inner.write().await;
        let entries = table.entry(iface.to_string()).or_default();
        match entries.iter_mut().find(|e| e.prefix.address == prefix.address) {
            Some(entry) => entry.prefix = prefix,
            None => entries.push(Entry {
                prefix,
                preferred: true,
            }),
        }
        Ok(())
    }

    /// State of `addr` on `iface`; malformed input reads as absent
    pub async fn state(&self, iface: &str, addr: &str) -> AddressState {
        let Ok(target) = crate::address::normalize(addr) else {
            return AddressState::Absent;
        };

        let table = self.inner.read().await;
        table
            .get(iface)
            .and_then(|entries| entries.iter().find(|e| e.prefix.address == target))
            .map(|e| {
                if e.preferred {
                    AddressState::Preferred
                } else {
                    AddressState::Deprecated
                }
            })
            .unwrap_or(AddressState::Absent)
    }

    /// Every address on `iface` including host/link scope, in insertion order
    pub async fn snapshot(&self, iface: &str) -> Vec<(AddressPrefix, AddressState)> {
        let table = self.inner.read().await;
        table
            .get(iface)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| {
                        let state = if e.preferred {
                            AddressState::Preferred
                        } else {
                            AddressState::Deprecated
                        };
                        (e.prefix, state)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn set_preferred(&self, iface: &str, addr: &AddressPrefix, preferred: bool) -> Result<(), Error> {
        let mut table = self.inner.write().await;
        let entry = table
            .get_mut(iface)
            .and_then(|entries| entries.iter_mut().find(|e| e.prefix.address == addr.address))
            .ok_or_else(|| not_found(iface, addr))?;
        entry.preferred = preferred;
        Ok(())
    }
}

/// Host-scope (loopback) or link-scope (fe80::/10) addresses are not managed
fn is_unmanaged_scope(addr: NormalizedAddress) -> bool {
    let ip: Ipv6Addr = addr.addr();
    ip.is_loopback() || (ip.segments()[0] & 0xffc0) == 0xfe80
}

fn not_found(iface: &str, addr: &AddressPrefix) -> Error {
    Error::executor(BACKEND, format!("address {} not found on {}", addr, iface))
}

#[async_trait]
impl AddressCommandExecutor for MemoryExecutor {
    async fn ensure_present(&self, iface: &str, addr: &AddressPrefix) -> Result<(), Error> {
        let mut table = self.inner.write().await;
        let entries = table.entry(iface.to_string()).or_default();
        if !entries.iter().any(|e| e.prefix.address == addr.address) {
            entries.push(Entry {
                prefix: *addr,
                preferred: true,
            });
        }
        Ok(())
    }

    async fn list_addresses(&self, iface: &str) -> Result<Vec<String>, Error> {
        let table = self.inner.read().await;
        Ok(table
            .get(iface)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| !is_unmanaged_scope(e.prefix.address))
                    .map(|e| e.prefix.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_preferred_lifetime_zero(&self, iface: &str, addr: &AddressPrefix) -> Result<(), Error> {
        self.set_preferred(iface, addr, false).await
    }

    async fn set_preferred_lifetime_default(&self, iface: &str, addr: &AddressPrefix) -> Result<(), Error> {
        self.set_preferred(iface, addr, true).await
    }

    async fn delete(&self, iface: &str, addr: &AddressPrefix) -> Result<(), Error> {
        let mut table = self.inner.write().await;
        let entries = table.get_mut(iface).ok_or_else(|| not_found(iface, addr))?;
        let before = entries.len();
        entries.retain(|e| e.prefix.address != addr.address);
        if entries.len() == before {
            return Err(not_found(iface, addr));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
