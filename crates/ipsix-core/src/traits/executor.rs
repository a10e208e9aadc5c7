// # Address Command Executor Trait
//
// Defines the capability boundary between the reconciler and the host's
// network stack.
//
// ## Implementations
//
// - iproute2 `ip` utility: `ipsix-ip-cmd` crate
// - In-memory table: `ipsix_core::executor::MemoryExecutor`
// - Future: rtnetlink
//
// ## Usage
//
// ```rust,ignore
// use ipsix_core::{AddressCommandExecutor, AddressPrefix};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let executor = /* AddressCommandExecutor implementation */;
//
//     let addr = AddressPrefix::parse("fd00::1", 64)?;
//     executor.ensure_present("eth0", &addr).await?;
//
//     for live in executor.list_addresses("eth0").await? {
//         println!("eth0 carries {}", live);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::fmt;

use crate::address::AddressPrefix;

/// The executor operations, used for logging and failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressOperation {
    /// Add if missing
    EnsurePresent,
    /// Query live addresses
    List,
    /// Set preferred lifetime to zero
    Deprecate,
    /// Restore the default preferred lifetime
    Prefer,
    /// Remove from the interface
    Delete,
}

impl fmt::Display for AddressOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressOperation::EnsurePresent => "ensure-present",
            AddressOperation::List => "list",
            AddressOperation::Deprecate => "deprecate",
            AddressOperation::Prefer => "prefer",
            AddressOperation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Trait for address executor implementations
///
/// Every operation is independent and non-transactional: a failure affects
/// only the single address it was called for. Implementations must be
/// thread-safe, since one executor is shared by all monitor tasks.
///
/// Implementations should bound the running time of each call and report a
/// hang as [`Error::Timeout`](crate::Error::Timeout) instead of blocking
/// forever.
#[async_trait]
pub trait AddressCommandExecutor: Send + Sync {
    /// Make sure `addr` is bound to `iface`
    ///
    /// An address that already exists is a success, not an error.
    async fn ensure_present(&self, iface: &str, addr: &AddressPrefix) -> Result<(), crate::Error>;

    /// List every IPv6 address currently bound to `iface`
    ///
    /// Entries are `addr/len` strings. Host-scope and link-scope addresses
    /// are excluded.
    async fn list_addresses(&self, iface: &str) -> Result<Vec<String>, crate::Error>;

    /// Mark `addr` deprecated (preferred lifetime zero) without removing it
    async fn set_preferred_lifetime_zero(
        &self,
        iface: &str,
        addr: &AddressPrefix,
    ) -> Result<(), crate::Error>;

    /// Restore `addr` to fully preferred status
    async fn set_preferred_lifetime_default(
        &self,
        iface: &str,
        addr: &AddressPrefix,
    ) -> Result<(), crate::Error>;

    /// Remove `addr` from `iface`
    async fn delete(&self, iface: &str, addr: &AddressPrefix) -> Result<(), crate::Error>;

    /// Backend name, for logs
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing executors from configuration
pub trait ExecutorFactory: Send + Sync {
    /// Create an executor instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Executor backend configuration
    /// - `engine`: Engine settings (the command timeout lives here)
    fn create(
        &self,
        config: &crate::config::ExecutorConfig,
        engine: &crate::config::EngineConfig,
    ) -> Result<std::sync::Arc<dyn AddressCommandExecutor>, crate::Error>;
}
