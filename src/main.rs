#![forbid(unsafe_code)]

//! `agent-control`: control-plane bridge for an agent CLI.
//!
//! Spawns the configured host CLI, multiplexes its NDJSON stream, answers
//! permission requests from the static policy, forwards stdin lines to the
//! host, and prints every domain payload to stdout as one JSON line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_control::capability::policy::StaticPermissionPolicy;
use agent_control::transport::reader::spawn_reader;
use agent_control::transport::spawner::{monitor_exit, spawn_host, SpawnConfig};
use agent_control::transport::writer::NdjsonWriter;
use agent_control::transport::Transport;
use agent_control::{
    AppError, CapabilityRegistry, ClientSettings, ControlClient, ControlConfig, Result,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-control", about = "Control-plane bridge for agent CLIs", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the host workspace root.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Model to select once the host is running.
    #[arg(long)]
    model: Option<String>,

    /// Permission mode to select once the host is running.
    #[arg(long)]
    permission_mode: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-control bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    // A pending stdin read cannot be cancelled; do not wait on it forever.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = ControlConfig::load_from_path(&args.config)?;

    if let Some(ws) = args.workspace {
        config.workspace_root = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
    }
    info!(host_cli = %config.host_cli, "configuration loaded");

    // ── Spawn host and wire transport ───────────────────
    let ct = CancellationToken::new();
    let host = spawn_host(&SpawnConfig::from(&config))?;

    let transport: Arc<dyn Transport> = Arc::new(NdjsonWriter::new(host.stdin));
    let (inbound, reader_handle) = spawn_reader(
        host.stdout,
        config.limits.channel_capacity,
        config.limits.max_line_bytes,
        ct.clone(),
    );
    let exit_handle = monitor_exit(host.child, ct.clone());

    // ── Start control client ────────────────────────────
    let registry = CapabilityRegistry::new()
        .with_permission_handler(Arc::new(StaticPermissionPolicy::new(&config.permissions)));
    let settings = ClientSettings::from(&config);
    let (client, outputs, router_handle) =
        ControlClient::start(Arc::clone(&transport), inbound, registry, &settings, ct.clone());

    let printer_handle = tokio::spawn(print_messages(outputs.messages));
    let errors_handle = tokio::spawn(log_errors(outputs.errors));
    let stdin_handle = tokio::spawn(forward_stdin(Arc::clone(&transport), ct.clone()));

    if let Some(model) = args.model {
        match client.set_model(Some(model), &ct).await {
            Ok(_) => info!("model selected"),
            Err(err) => warn!(%err, "set_model failed"),
        }
    }
    if let Some(mode) = args.permission_mode {
        match client.set_permission_mode(mode, &ct).await {
            Ok(_) => info!("permission mode selected"),
            Err(err) => warn!(%err, "set_permission_mode failed"),
        }
    }

    info!("agent-control ready");

    // ── Wait for shutdown or host EOF ───────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        result = router_handle => {
            if let Err(err) = result {
                error!(%err, "control router task failed");
            }
            info!("host stream closed");
        }
    }
    ct.cancel();

    let _ = tokio::join!(printer_handle, errors_handle, reader_handle, exit_handle);
    stdin_handle.abort();
    info!(pending = client.pending_requests(), "agent-control shut down");

    Ok(())
}

/// Write each domain payload to stdout as one JSON line.
async fn print_messages(mut messages: mpsc::Receiver<Value>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = messages.recv().await {
        let mut line = message.to_string();
        line.push('\n');
        if let Err(err) = stdout.write_all(line.as_bytes()).await {
            warn!(%err, "failed to write to stdout");
            break;
        }
        if let Err(err) = stdout.flush().await {
            warn!(%err, "failed to flush stdout");
            break;
        }
    }
}

async fn log_errors(mut errors: mpsc::Receiver<AppError>) {
    while let Some(err) = errors.recv().await {
        error!(%err, "host transport failed");
    }
}

/// Forward non-empty stdin lines to the host verbatim.
async fn forward_stdin(transport: Arc<dyn Transport>, ct: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            () = ct.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(err) = transport.write(line).await {
                        warn!(%err, "failed to forward stdin line");
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "stdin read failed");
                    break;
                }
            },
        }
    }
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
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

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
