//! Core traits for the IPv6 reconciler
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`AddressCommandExecutor`]: List, add, re-prefer, deprecate and delete addresses

pub mod executor;

pub use executor::{AddressCommandExecutor, AddressOperation, ExecutorFactory};
