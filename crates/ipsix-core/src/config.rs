//! Configuration types for the IPv6 reconciler
//!
//! This module defines the declaration list the reconciler consumes plus the
//! engine and executor settings, all loadable from a YAML document.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::address::MAX_PREFIX_LEN;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpsixConfig {
    /// Interfaces to manage
    pub interfaces: Vec<InterfaceDeclaration>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Address executor backend
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl IpsixConfig {
    /// Create a configuration for the given interfaces with default settings
    pub fn new(interfaces: Vec<InterfaceDeclaration>) -> Self {
        Self {
            interfaces,
            engine: EngineConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, crate::Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Validate the configuration
    ///
    /// Address strings are not checked here: a malformed address
    /// only affects itself and is skipped at reconcile time.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interfaces.is_empty() {
            return Err(crate::Error::config("No interfaces configured"));
        }

        let mut seen = HashSet::new();
        for iface in &self.interfaces {
            if iface.name.trim().is_empty() {
                return Err(crate::Error::config("Interface name cannot be empty"));
            }
            if !seen.insert(iface.name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Interface {} is declared more than once",
                    iface.name
                )));
            }
        }

        self.engine.validate()?;
        self.executor.validate()?;

        Ok(())
    }
}

/// Declared state of one interface
///
/// Constructed once from configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDeclaration {
    /// Interface name (e.g., "eth0")
    pub name: String,

    /// Address that must stay preferred; empty means none
    #[serde(default)]
    pub priority_ip: String,

    /// Addresses that must be present, each optionally with `/len`
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Whether to remove undeclared addresses continuously
    #[serde(default)]
    pub monitor_ipv6: bool,
}

impl InterfaceDeclaration {
    /// Create a declaration with no addresses
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority_ip: String::new(),
            addresses: Vec::new(),
            monitor_ipv6: false,
        }
    }

    /// Set the priority address
    pub fn with_priority(mut self, priority_ip: impl Into<String>) -> Self {
        self.priority_ip = priority_ip.into();
        self
    }

    /// Set the declared addresses
    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable drift monitoring
    pub fn with_monitor(mut self, monitor: bool) -> Self {
        self.monitor_ipv6 = monitor;
        self
    }

    /// The priority address, if one is set
    pub fn priority(&self) -> Option<&str> {
        let p = self.priority_ip.trim();
        (!p.is_empty()).then_some(p)
    }
}

/// Which address set the deprecation pass walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeprecationSource {
    /// Deprecate declared addresses other than the priority address
    #[default]
    Declared,
    /// Deprecate every live address other than the priority address
    Live,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between drift monitor polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on a single executor call (in seconds)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Prefix length applied to declared addresses written without one
    #[serde(default = "default_prefix_len")]
    pub default_prefix_len: u8,

    /// Address set used by the deprecation pass
    #[serde(default)]
    pub deprecation_source: DeprecationSource,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Command timeout as a [`Duration`]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Validate the engine settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("poll_interval_secs must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(crate::Error::config("command_timeout_secs must be > 0"));
        }
        if self.default_prefix_len == 0 || self.default_prefix_len > MAX_PREFIX_LEN {
            return Err(crate::Error::config(format!(
                "default_prefix_len must be between 1 and {}. Got: {}",
                MAX_PREFIX_LEN, self.default_prefix_len
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            default_prefix_len: default_prefix_len(),
            deprecation_source: DeprecationSource::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    5
}

fn default_prefix_len() -> u8 {
    64
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Address executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorConfig {
    /// iproute2 `ip` utility
    IpCommand {
        /// Path to the `ip` binary
        #[serde(default = "default_ip_path")]
        ip_path: String,
    },

    /// In-memory address table (dry run)
    Memory,

    /// Custom executor
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ExecutorConfig {
    /// Validate the executor configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ExecutorConfig::IpCommand { ip_path } => {
                if ip_path.is_empty() {
                    return Err(crate::Error::config("ip_path cannot be empty"));
                }
                Ok(())
            }
            ExecutorConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom executor factory cannot be empty",
                    ));
                }
                Ok(())
            }
            ExecutorConfig::Memory => Ok(()),
        }
    }

    /// Get the backend type name used for registry lookup
    pub fn type_name(&self) -> &str {
        match self {
            ExecutorConfig::IpCommand { .. } => "ip_command",
            ExecutorConfig::Memory => "memory",
            ExecutorConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig::IpCommand {
            ip_path: default_ip_path(),
        }
    }
}

fn default_ip_path() -> String {
    "/sbin/ip".to_string()
}
