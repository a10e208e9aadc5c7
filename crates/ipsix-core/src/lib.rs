// # ipsix-core
//
// Core library for declarative IPv6 address management.
//
// ## Architecture Overview
//
// This library keeps a declared set of IPv6 addresses on network interfaces:
// - **AddressCommandExecutor**: Trait wrapping list/add/change/delete of interface addresses
// - **normalize**: Turns address strings into comparable values
// - **Reconciler**: Applies one interface declaration (present → deprecate → prefer)
// - **DriftMonitor**: Periodically removes addresses that are not declared
// - **Orchestrator**: Reconciles every interface and supervises the monitors
// - **ExecutorRegistry**: Plugin-based registry for executor backends
//
// ## Design Principles
//
// 1. **Failure Isolation**: One address, interface or poll cycle never aborts another
// 2. **Idempotency**: Every pass re-reads live state and converges to the same result
// 3. **Capability Injection**: Host access only through an executor trait object
// 4. **Library-First**: The daemon is a thin wrapper around this crate
// 5. **Cancellable**: Every monitor task owns a cancellation token

pub mod address;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use address::{AddressPrefix, NormalizedAddress, normalize};
pub use config::{DeprecationSource, EngineConfig, ExecutorConfig, InterfaceDeclaration, IpsixConfig};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventSink};
pub use executor::{AddressState, MemoryExecutor};
pub use monitor::{DriftMonitor, MonitorExit, MonitorSet, PollOutcome};
pub use orchestrator::Orchestrator;
pub use reconciler::{AddressFailure, ReconcileReport, Reconciler};
pub use registry::ExecutorRegistry;
pub use traits::{AddressCommandExecutor, AddressOperation, ExecutorFactory};
