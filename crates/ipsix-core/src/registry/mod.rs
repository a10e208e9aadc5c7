//! Plugin-based executor registry
//!
//! The registry maps executor backend names to factories, so the daemon can
//! build whichever backend the configuration names without a hardcoded
//! if-else chain.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipsix_core::registry::ExecutorRegistry;
//! use ipsix_core::config::{EngineConfig, ExecutorConfig};
//!
//! let registry = ExecutorRegistry::with_builtin();
//! ipsix_ip_cmd::register(&registry);
//!
//! let executor = registry.create_executor(
//!     &ExecutorConfig::default(),
//!     &EngineConfig::default(),
//! )?;
//! ```
//!
//! ## Registration
//!
//! Backend crates expose a `register()` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &ExecutorRegistry) {
//!     registry.register_executor("ip_command", Box::new(IpCommandFactory));
//! }
//! ```

use crate::config::{EngineConfig, ExecutorConfig};
use crate::error::{Error, Result};
use crate::executor::MemoryExecutor;
use crate::traits::{AddressCommandExecutor, ExecutorFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Factory for the built-in in-memory backend
pub struct MemoryExecutorFactory;

impl ExecutorFactory for MemoryExecutorFactory {
    fn create(
        &self,
        config: &ExecutorConfig,
        _engine: &EngineConfig,
    ) -> Result<Arc<dyn AddressCommandExecutor>> {
        match config {
            ExecutorConfig::Memory => Ok(Arc::new(MemoryExecutor::new())),
            _ => Err(Error::config("Invalid config for memory executor")),
        }
    }
}

/// Executor registry
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Box<dyn ExecutorFactory>>>,
}

impl ExecutorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` backend registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_executor("memory", Box::new(MemoryExecutorFactory));
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Box<dyn ExecutorFactory>>> {
        self.executors.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Box<dyn ExecutorFactory>>> {
        self.executors.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an executor factory
    ///
    /// # Parameters
    ///
    /// - `name`: Backend type name (e.g., "ip_command", "memory")
    /// - `factory`: Factory object for creating executor instances
    pub fn register_executor(&self, name: impl Into<String>, factory: Box<dyn ExecutorFactory>) {
        self.write().insert(name.into(), factory);
    }

    /// Create an executor from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn AddressCommandExecutor>)`: Created executor instance
    /// - `Err(Error)`: If the backend is not registered or creation fails
    pub fn create_executor(
        &self,
        config: &ExecutorConfig,
        engine: &EngineConfig,
    ) -> Result<Arc<dyn AddressCommandExecutor>> {
        let backend = config.type_name();
        let executors = self.read();

        let factory = executors
            .get(backend)
            .ok_or_else(|| Error::config(format!("Unknown executor type: {}", backend)))?;

        factory.create(config, engine)
    }

    /// List all registered backend names, sorted
    pub fn list_executors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered
    pub fn has_executor(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_memory_backend() {
        let registry = ExecutorRegistry::with_builtin();
        assert!(registry.has_executor("memory"));
        assert!(!registry.has_executor("ip_command"));

        let executor = registry
            .create_executor(&ExecutorConfig::Memory, &EngineConfig::default())
            .unwrap();
        assert_eq!(executor.backend_name(), "memory");
    }

    #[test]
    fn test_unknown_backend() {
        let registry = ExecutorRegistry::new();
        let result = registry.create_executor(&ExecutorConfig::default(), &EngineConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_custom_factory_lookup() {
        let registry = ExecutorRegistry::new();
        registry.register_executor("dry", Box::new(MemoryExecutorFactory));

        let config = ExecutorConfig::Custom {
            factory: "dry".to_string(),
            config: serde_json::json!({}),
        };
        // Found by name, but the memory factory only accepts its own config
        assert!(registry.create_executor(&config, &EngineConfig::default()).is_err());
        assert_eq!(registry.list_executors(), vec!["dry".to_string()]);
    }
}
