//! Runs the external engine against a rendered script.
//!
//! The script is written to a uniquely named temporary file that lives only for
//! the duration of [`EngineInvoker::invoke`]. stdout and stderr are merged into a
//! single log in the order chunks arrive. The run is bounded by a timeout and can
//! be aborted through a [`CancellationToken`]; in both cases the child is killed.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{EngineCommand, ServerConfig};
use crate::render::RenderedScript;

const READ_CHUNK: usize = 8 * 1024;
/// How long to keep draining pipes after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// How the engine run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    Success,
    /// Started, then exited with a failure status. `code` is `None` when killed by a signal.
    Failed { code: Option<i32> },
    /// The process could not be started at all (binary missing, not executable, ...).
    SpawnFailed { reason: String },
    TimedOut { after: Duration },
    Cancelled,
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Success => write!(f, "exit status 0"),
            ExitKind::Failed { code: Some(code) } => write!(f, "exit status {}", code),
            ExitKind::Failed { code: None } => write!(f, "terminated by signal"),
            ExitKind::SpawnFailed { reason } => write!(f, "failed to start engine: {}", reason),
            ExitKind::TimedOut { after } => write!(f, "timed out after {}s", after.as_secs_f64()),
            ExitKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub exit: ExitKind,
    /// Combined stdout + stderr.
    pub log: String,
}

impl InvocationResult {
    pub fn new(exit: ExitKind, log: impl Into<String>) -> Self {
        Self {
            exit,
            log: log.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit == ExitKind::Success
    }
}

/// Failures that happen before the engine is even attempted.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("failed to create script file in {}: {source}", .dir.display())]
    ScriptFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write script file: {0}")]
    ScriptWrite(#[source] io::Error),
}

#[async_trait]
pub trait EngineInvoker: Send + Sync {
    async fn invoke(
        &self,
        script: &RenderedScript,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, InvokeError>;
}

/// Spawns the configured engine binary, one process per call.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    engine: EngineCommand,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl ProcessInvoker {
    pub fn new(engine: EngineCommand, scratch_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            engine,
            scratch_dir: scratch_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.engine.clone(),
            config.scratch_dir.clone(),
            config.engine_timeout,
        )
    }

    fn write_script(&self, script: &RenderedScript) -> Result<TempPath, InvokeError> {
        let mut file = tempfile::Builder::new()
            .prefix("blender_")
            .suffix(".py")
            .tempfile_in(&self.scratch_dir)
            .map_err(|source| InvokeError::ScriptFile {
                dir: self.scratch_dir.clone(),
                source,
            })?;
        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(InvokeError::ScriptWrite)?;
        // Close our handle; the path is still removed when dropped
        Ok(file.into_temp_path())
    }
}

#[async_trait]
impl EngineInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        script: &RenderedScript,
        cancel: &CancellationToken,
    ) -> Result<InvocationResult, InvokeError> {
        let script_path = self.write_script(script)?;
        debug!(path = %script_path.display(), "Script written");

        let spawned = Command::new(&self.engine.program)
            .args(&self.engine.args)
            .arg(&*script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let result = match spawned {
            Ok(child) => supervise(child, self.timeout, cancel).await,
            Err(e) => {
                warn!(program = %self.engine.program, error = %e, "Failed to start engine");
                InvocationResult::new(ExitKind::SpawnFailed { reason: e.to_string() }, "")
            }
        };

        if let Err(e) = script_path.close() {
            warn!(error = %e, "Failed to remove script file");
        }
        Ok(result)
    }
}

async fn supervise(
    mut child: Child,
    timeout: Duration,
    cancel: &CancellationToken,
) -> InvocationResult {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut capture = tokio::spawn(collect_merged(
        child.stdout.take(),
        child.stderr.take(),
        Arc::clone(&captured),
    ));

    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => ExitKind::Success,
            Ok(status) => ExitKind::Failed { code: status.code() },
            Err(e) => {
                warn!(error = %e, "Failed to wait for engine");
                ExitKind::Failed { code: None }
            }
        },
        _ = tokio::time::sleep(timeout) => ExitKind::TimedOut { after: timeout },
        _ = cancel.cancelled() => ExitKind::Cancelled,
    };

    if matches!(exit, ExitKind::TimedOut { .. } | ExitKind::Cancelled) {
        warn!(%exit, "Killing engine");
        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to kill engine");
        }
    }

    match tokio::time::timeout(DRAIN_GRACE, &mut capture).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Output capture task failed"),
        Err(_) => {
            // A leftover grandchild still holds the pipes; keep what we have
            warn!("Engine output still open after exit, stopping capture");
            capture.abort();
            let _ = capture.await;
        }
    }

    let bytes = std::mem::take(&mut *lock_log(&captured));
    InvocationResult::new(exit, String::from_utf8_lossy(&bytes).into_owned())
}

async fn collect_merged<O, E>(
    mut stdout: Option<O>,
    mut stderr: Option<E>,
    sink: Arc<Mutex<Vec<u8>>>,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => match read {
                Ok(n) if n > 0 => lock_log(&sink).extend_from_slice(&out_buf[..n]),
                _ => stdout = None,
            },
            read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => match read {
                Ok(n) if n > 0 => lock_log(&sink).extend_from_slice(&err_buf[..n]),
                _ => stderr = None,
            },
            else => break,
        }
    }
}

fn lock_log(log: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}
