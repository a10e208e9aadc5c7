//! Built-in address executor implementations
//!
//! Available backends:
//! - [`MemoryExecutor`]: In-memory address table (dry run, tests)
//!
//! The iproute2 backend lives in the `ipsix-ip-cmd` crate.

pub mod memory;

pub use memory::{AddressState, MemoryExecutor};
