// # iproute2 Address Executor
//
// This crate provides an AddressCommandExecutor backed by the iproute2 `ip`
// utility on Linux.
//
// ## Commands
//
// | Operation        | Command                                                 |
// |------------------|---------------------------------------------------------|
// | ensure present   | `ip -6 addr add <addr>/<len> dev <iface>`               |
// | list             | `ip -6 -j addr show dev <iface>`                        |
// | deprecate        | `ip -6 addr change <addr>/<len> dev <iface> preferred_lft 0`       |
// | prefer           | `ip -6 addr change <addr>/<len> dev <iface> preferred_lft forever` |
// | delete           | `ip -6 addr del <addr>/<len> dev <iface>`               |
//
// Arguments are passed directly to the binary, never through a shell, so
// interface names need no quoting.
//
// Every command is bounded by the configured timeout; a child that outlives
// it is killed and the call fails with `Error::Timeout`.
//
// ## Platform Support
//
// The factory refuses to build this executor on anything but Linux.

use async_trait::async_trait;
use ipsix_core::config::{EngineConfig, ExecutorConfig};
use ipsix_core::traits::{AddressCommandExecutor, ExecutorFactory};
use ipsix_core::{AddressPrefix, Error, ExecutorRegistry, Result};
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Default path to the `ip` binary
pub const IP_CMD: &str = "/sbin/ip";

/// Marker iproute2 prints when adding an address that is already bound
const ALREADY_EXISTS: &str = "File exists";

const BACKEND: &str = "ip_command";

/// Result of one `ip` invocation
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success, -1 = killed by signal)
    pub exit_code: i32,
    /// Trimmed stdout
    pub stdout: String,
    /// Trimmed stderr
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executor that shells out to `ip`
#[derive(Debug, Clone)]
pub struct IpCommandExecutor {
    ip_path: String,
    timeout: Duration,
}

impl IpCommandExecutor {
    /// Create an executor using the `ip` binary at `ip_path`
    pub fn new(ip_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ip_path: ip_path.into(),
            timeout,
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.ip_path, args.join(" "))
    }

    /// Run `ip` with `args`, bounded by the timeout
    async fn exec(&self, args: &[String]) -> Result<ExecResult> {
        let command = self.command_line(args);
        debug!(command = %command, "Executing command");

        let child = Command::new(&self.ip_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(Error::CommandSpawn { command, source }),
            Err(_) => {
                warn!(command = %command, "Command timed out after {:?}", self.timeout);
                return Err(Error::timeout(command, self.timeout));
            }
        };

        let result = ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        if result.success() {
            trace!(command = %command, "Command succeeded");
        } else {
            debug!(
                command = %command,
                exit_code = result.exit_code,
                stderr = %result.stderr,
                "Command failed"
            );
        }

        Ok(result)
    }

    /// Run `ip` and turn a non-zero exit into [`Error::CommandFailed`]
    async fn exec_checked(&self, args: &[String]) -> Result<String> {
        let result = self.exec(args).await?;
        if result.success() {
            Ok(result.stdout)
        } else {
            Err(Error::CommandFailed {
                command: self.command_line(args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            })
        }
    }
}

fn add_args(iface: &str, addr: &AddressPrefix) -> Vec<String> {
    vec![
        "-6".into(),
        "addr".into(),
        "add".into(),
        addr.to_string(),
        "dev".into(),
        iface.into(),
    ]
}

fn show_args(iface: &str) -> Vec<String> {
    vec![
        "-6".into(),
        "-j".into(),
        "addr".into(),
        "show".into(),
        "dev".into(),
        iface.into(),
    ]
}

fn change_args(iface: &str, addr: &AddressPrefix, preferred_lft: &str) -> Vec<String> {
    vec![
        "-6".into(),
        "addr".into(),
        "change".into(),
        addr.to_string(),
        "dev".into(),
        iface.into(),
        "preferred_lft".into(),
        preferred_lft.into(),
    ]
}

fn del_args(iface: &str, addr: &AddressPrefix) -> Vec<String> {
    vec![
        "-6".into(),
        "addr".into(),
        "del".into(),
        addr.to_string(),
        "dev".into(),
        iface.into(),
    ]
}

/// True when a failed add only failed because the address is already bound
fn is_already_present(output: &str) -> bool {
    output.contains(ALREADY_EXISTS)
}

#[derive(Debug, Deserialize)]
struct LinkAddresses {
    #[serde(default)]
    addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Deserialize)]
struct AddrInfo {
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    local: Option<String>,
    #[serde(default)]
    prefixlen: Option<u8>,
    #[serde(default)]
    scope: Option<String>,
}

/// Extract managed IPv6 addresses from `ip -j addr show` output
///
/// Host-scope, link-scope and non-inet6 entries are dropped. Each remaining
/// entry is returned as `addr/len`.
pub fn parse_addr_show_json(json: &str) -> Result<Vec<String>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    let links: Vec<LinkAddresses> = serde_json::from_str(json)
        .map_err(|e| Error::parse(format!("unexpected `ip -j addr show` output: {}", e)))?;

    Ok(links
        .into_iter()
        .flat_map(|link| link.addr_info)
        .filter(|info| info.family.as_deref().is_none_or(|f| f == "inet6"))
        .filter(|info| !matches!(info.scope.as_deref(), Some("host") | Some("link")))
        .filter_map(|info| {
            let local = info.local?;
            Some(format!("{}/{}", local, info.prefixlen.unwrap_or(128)))
        })
        .collect())
}

#[async_trait]
impl AddressCommandExecutor for IpCommandExecutor {
    async fn ensure_present(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        let args = add_args(iface, addr);
        let result = self.exec(&args).await?;
        if result.success() || is_already_present(&result.combined_output()) {
            return Ok(());
        }
        Err(Error::CommandFailed {
            command: self.command_line(&args),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }

    async fn list_addresses(&self, iface: &str) -> Result<Vec<String>> {
        let stdout = self.exec_checked(&show_args(iface)).await?;
        parse_addr_show_json(&stdout)
    }

    async fn set_preferred_lifetime_zero(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        self.exec_checked(&change_args(iface, addr, "0")).await?;
        Ok(())
    }

    async fn set_preferred_lifetime_default(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        self.exec_checked(&change_args(iface, addr, "forever")).await?;
        Ok(())
    }

    async fn delete(&self, iface: &str, addr: &AddressPrefix) -> Result<()> {
        self.exec_checked(&del_args(iface, addr)).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for creating `ip` command executors
pub struct IpCommandFactory;

#[cfg(target_os = "linux")]
impl ExecutorFactory for IpCommandFactory {
    fn create(
        &self,
        config: &ExecutorConfig,
        engine: &EngineConfig,
    ) -> Result<Arc<dyn AddressCommandExecutor>> {
        match config {
            ExecutorConfig::IpCommand { ip_path } => Ok(Arc::new(IpCommandExecutor::new(
                ip_path.clone(),
                engine.command_timeout(),
            ))),
            _ => Err(Error::config("Invalid config for ip command executor")),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl ExecutorFactory for IpCommandFactory {
    fn create(
        &self,
        _config: &ExecutorConfig,
        _engine: &EngineConfig,
    ) -> Result<Arc<dyn AddressCommandExecutor>> {
        Err(Error::config("The ip command executor is only supported on Linux"))
    }
}

/// Register the `ip` command executor with a registry
pub fn register(registry: &ExecutorRegistry) {
    registry.register_executor(BACKEND, Box::new(IpCommandFactory));
}
