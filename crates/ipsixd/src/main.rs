// # ipsixd - IPv6 Address Daemon
//
// The ipsixd daemon is a thin integration layer. It is responsible for:
// 1. Reading settings from environment variables
// 2. Loading the interface declarations from YAML
// 3. Registering executor backends
// 4. Starting the orchestrator and stopping it on a signal
//
// Reconciliation and drift correction live in ipsix-core.
//
// ## Configuration
//
// - `IPSIX_CONFIG`: Path to the YAML declaration file
//   (default `/etc/multi-ipsix/atpajah.yaml`)
// - `IPSIX_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `IPSIX_ONESHOT`: `true` to reconcile once and exit without monitoring
// - `IPSIX_POLL_INTERVAL_SECS`: Overrides `engine.poll_interval_secs`
//
// ## Example
//
// ```bash
// export IPSIX_CONFIG=/etc/multi-ipsix/atpajah.yaml
// export IPSIX_LOG_LEVEL=debug
//
// ipsixd
// ```

use anyhow::{Context, Result};
use ipsix_core::{EngineEvent, ExecutorRegistry, IpsixConfig, Orchestrator};
use std::env;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_CONFIG_PATH: &str = "/etc/multi-ipsix/atpajah.yaml";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum IpsixExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<IpsixExitCode> for ExitCode {
    fn from(code: IpsixExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings taken from the environment
struct Settings {
    config_path: String,
    log_level: String,
    oneshot: bool,
    poll_interval_secs: Option<u64>,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        let poll_interval_secs = match env::var("IPSIX_POLL_INTERVAL_SECS") {
            Ok(s) => Some(s.trim().parse().with_context(|| {
                format!("IPSIX_POLL_INTERVAL_SECS must be a number of seconds. Got: {}", s)
            })?),
            Err(_) => None,
        };

        Ok(Self {
            config_path: env::var("IPSIX_CONFIG")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
            log_level: env::var("IPSIX_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            oneshot: env::var("IPSIX_ONESHOT")
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            poll_interval_secs,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.config_path.is_empty() {
            anyhow::bail!("IPSIX_CONFIG cannot be empty");
        }

        if let Some(interval) = self.poll_interval_secs
            && !(1..=3600).contains(&interval)
        {
            anyhow::bail!(
                "IPSIX_POLL_INTERVAL_SECS must be between 1 and 3600 seconds. Got: {}",
                interval
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "IPSIX_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Load the declaration file and apply environment overrides
    fn load_config(&self) -> Result<IpsixConfig> {
        let mut config = IpsixConfig::from_file(&self.config_path)
            .with_context(|| format!("loading {}", self.config_path))?;

        if let Some(secs) = self.poll_interval_secs {
            config.engine.poll_interval_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return IpsixExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return IpsixExitCode::ConfigError.into();
    }

    let log_level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return IpsixExitCode::ConfigError.into();
    }

    info!("Starting ipsixd daemon");

    let config = match settings.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return IpsixExitCode::ConfigError.into();
        }
    };
    info!(
        "Configuration loaded from {}: {} interface(s)",
        settings.config_path,
        config.interfaces.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return IpsixExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config, settings.oneshot).await {
            Ok(()) => IpsixExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup error: {:#}", e);
                IpsixExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                IpsixExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Separates failures before the orchestrator starts from those after
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Run the daemon
async fn run_daemon(config: IpsixConfig, oneshot: bool) -> Result<(), DaemonError> {
    let registry = ExecutorRegistry::with_builtin();

    #[cfg(feature = "ip-cmd")]
    {
        info!("Registering ip command executor");
        ipsix_ip_cmd::register(&registry);
    }

    let executor = registry
        .create_executor(&config.executor, &config.engine)
        .map_err(|e| DaemonError::Startup(e.into()))?;
    info!("Using {} executor", executor.backend_name());

    let (orchestrator, events) =
        Orchestrator::new(executor, config).map_err(|e| DaemonError::Startup(e.into()))?;
    let event_log = tokio::spawn(log_events(events));

    if oneshot {
        let reports = orchestrator.reconcile_all().await;
        for report in reports.iter().filter(|r| !r.is_clean()) {
            warn!(
                "{}: {} failure(s) during reconciliation",
                report.interface,
                report.failures.len()
            );
        }
        info!("One-shot reconciliation finished for {} interface(s)", reports.len());
        drop(orchestrator);
        let _ = event_log.await;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let watcher = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match wait_for_shutdown().await {
                Ok(signal) => info!("Received shutdown signal: {}", signal),
                Err(e) => error!("Signal handling failed, shutting down: {:#}", e),
            }
            shutdown.cancel();
        })
    };

    let result = orchestrator.run_with_shutdown(shutdown.clone()).await;
    shutdown.cancel();
    watcher.abort();

    drop(orchestrator);
    let _ = event_log.await;

    result.map_err(|e| DaemonError::Runtime(e.into()))?;
    info!("ipsixd stopped");
    Ok(())
}

/// Log engine events until the orchestrator goes away
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "Engine event");
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
