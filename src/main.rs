#![forbid(unsafe_code)]

//! `compliance-gate` — compliance rule evaluation daemon.
//!
//! Bootstraps configuration, loads the initial rule snapshot, starts the
//! background synchronizer and directory watcher, and serves engine
//! requests over the local IPC socket until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use compliance_gate::config::GlobalConfig;
use compliance_gate::ipc::server;
use compliance_gate::policy::sync::{spawn_sync_task, SyncSettings};
use compliance_gate::policy::watcher::PolicyWatcher;
use compliance_gate::{AppError, ComplianceEngine, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "compliance-gate", about = "Compliance rule evaluation daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Disable filesystem change notifications regardless of config.
    #[arg(long)]
    no_watch: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("compliance-gate bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(
        base_dir = %config.base_dir.display(),
        dynamic_dir = %config.dynamic_dir.display(),
        "configuration loaded"
    );

    // ── Initial rule snapshot ───────────────────────────
    let engine = ComplianceEngine::start(SyncSettings::from_config(&config)).await?;
    let status = engine.status();
    info!(
        version = status.version,
        policies = status.policy_count,
        dynamic_policies = status.dynamic_policy_count,
        rules = status.rule_count,
        "rule engine ready"
    );

    // ── Start synchronization ───────────────────────────
    let ct = CancellationToken::new();
    let sync_handle = spawn_sync_task(
        Arc::clone(engine.synchronizer()),
        config.poll_interval(),
        ct.clone(),
    );

    let _watcher = if config.watch && !args.no_watch {
        match PolicyWatcher::start(Arc::clone(engine.synchronizer())) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                error!(%err, "rule watcher unavailable, relying on polling");
                None
            }
        }
    } else {
        info!("rule directory watching disabled");
        None
    };

    // ── Start IPC server ────────────────────────────────
    let ipc_handle = server::spawn_ipc_server(engine.clone(), config.ipc_name.clone(), ct.clone())?;

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(sync_handle, ipc_handle);
    info!("compliance-gate shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
