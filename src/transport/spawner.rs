//! Host CLI process spawner.
//!
//! Spawns the host agent process with:
//! - `kill_on_drop(true)` so the process is cleaned up automatically.
//! - `env_clear()` + a safe variable allowlist so unrelated secrets in the
//!   controller's environment never reach the child.
//! - Piped stdio: stdin/stdout carry the NDJSON stream, stderr is forwarded
//!   to the log.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControlConfig;
use crate::{AppError, Result};

/// Environment variables inherited by the spawned host process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "ANTHROPIC_API_KEY",
    "CLAUDE_CONFIG_DIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Configuration for spawning the host process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Host CLI binary.
    pub host_cli: String,
    /// Arguments passed to the host CLI.
    pub host_cli_args: Vec<String>,
    /// Working directory of the child process.
    pub workspace_root: PathBuf,
}

impl From<&ControlConfig> for SpawnConfig {
    fn from(config: &ControlConfig) -> Self {
        Self {
            host_cli: config.host_cli.clone(),
            host_cli_args: config.host_cli_args.clone(),
            workspace_root: config.workspace_root.clone(),
        }
    }
}

/// Active stdio connection to a spawned host process.
///
/// The caller keeps `child` alive (it has `kill_on_drop(true)`), hands
/// `stdin` to a [`NdjsonWriter`](crate::transport::writer::NdjsonWriter) and
/// `stdout` to [`spawn_reader`](crate::transport::reader::spawn_reader).
#[derive(Debug)]
pub struct HostConnection {
    /// Child process handle.
    pub child: Child,
    /// Host stdin, the outbound frame sink.
    pub stdin: ChildStdin,
    /// Host stdout, the inbound frame source.
    pub stdout: ChildStdout,
}

/// Spawn the host process with piped stdio.
///
/// # Errors
///
/// - `AppError::Transport("failed to spawn host: …")`: OS spawn failure.
/// - `AppError::Transport("failed to capture host …")`: a stdio pipe was
///   not available.
pub fn spawn_host(config: &SpawnConfig) -> Result<HostConnection> {
    let mut cmd = Command::new(&config.host_cli);
    cmd.args(&config.host_cli_args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.current_dir(&config.workspace_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Transport(format!("failed to spawn host: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Transport("failed to capture host stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Transport("failed to capture host stdout".into()))?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "host_stderr", "{line}");
            }
        });
    }

    info!(host_cli = %config.host_cli, pid = ?child.id(), "host process spawned");

    Ok(HostConnection {
        child,
        stdin,
        stdout,
    })
}

/// Spawn a background task that awaits child-process exit and logs it.
///
/// The task exits early when `cancel` fires; dropping the child then kills
/// the process.
#[must_use]
pub fn monitor_exit(mut child: Child, cancel: CancellationToken) -> JoinHandle<Option<i32>> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => match result {
                Ok(status) => {
                    let code = status.code();
                    match code {
                        Some(c) => info!(exit_code = c, "host process exited"),
                        None => info!("host process terminated by signal"),
                    }
                    code
                }
                Err(err) => {
                    warn!(%err, "error waiting for host process");
                    None
                }
            },
            () = cancel.cancelled() => {
                info!("monitor_exit: cancellation received, stopping host");
                None
            }
        }
    })
}
