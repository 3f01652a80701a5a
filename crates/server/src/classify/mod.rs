//! Turns an engine run into exactly one [`Outcome`].
//!
//! Precedence, first match wins:
//! 1. the process did not start or did not exit cleanly
//! 2. the log looks like the engine's scripting layer failed
//! 3. no artifact at the expected path
//! 4. the artifact is empty
//! 5. success

use std::io;
use std::path::Path;

use tracing::warn;

use crate::invoke::{ExitKind, InvocationResult};

/// Log fragments that mean the script failed even though the engine exited 0.
/// Case-sensitive, matched anywhere in the log.
pub const ENGINE_FAILURE_MARKERS: [&str; 2] = ["Traceback", "Error:"];

/// Heuristic: the engine swallows Python exceptions and still exits 0, so the
/// log is the only signal. User code that prints these words trips it too.
pub fn looks_like_engine_failure(log: &str) -> bool {
    ENGINE_FAILURE_MARKERS.iter().any(|marker| log.contains(marker))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactCheck {
    pub exists: bool,
    pub size: u64,
}

impl ArtifactCheck {
    pub async fn inspect(path: &Path) -> Self {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Self {
                exists: true,
                size: meta.len(),
            },
            Ok(_) => Self::missing(),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to stat artifact");
                }
                Self::missing()
            }
        }
    }

    fn missing() -> Self {
        Self {
            exists: false,
            size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Vec<u8>),
    ProcessFailed { failure: ExitKind, log: String },
    EngineReportedError(String),
    ArtifactMissing(String),
    ArtifactEmpty(String),
}

impl Outcome {
    /// Captured engine log; `None` only for [`Outcome::Success`].
    pub fn log(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::ProcessFailed { log, .. }
            | Outcome::EngineReportedError(log)
            | Outcome::ArtifactMissing(log)
            | Outcome::ArtifactEmpty(log) => Some(log.as_str()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::ProcessFailed { .. } => "process_failed",
            Outcome::EngineReportedError(_) => "engine_reported_error",
            Outcome::ArtifactMissing(_) => "artifact_missing",
            Outcome::ArtifactEmpty(_) => "artifact_empty",
        }
    }
}

pub async fn classify(result: InvocationResult, artifact_path: &Path) -> Outcome {
    let InvocationResult { exit, log } = result;

    if exit != ExitKind::Success {
        return Outcome::ProcessFailed { failure: exit, log };
    }
    if looks_like_engine_failure(&log) {
        return Outcome::EngineReportedError(log);
    }

    let check = ArtifactCheck::inspect(artifact_path).await;
    if !check.exists {
        return Outcome::ArtifactMissing(log);
    }
    if check.size == 0 {
        return Outcome::ArtifactEmpty(log);
    }

    match tokio::fs::read(artifact_path).await {
        Ok(bytes) if !bytes.is_empty() => Outcome::Success(bytes),
        Ok(_) => Outcome::ArtifactEmpty(log),
        Err(e) => {
            warn!(
                path = %artifact_path.display(),
                error = %e,
                "Artifact vanished before it could be read"
            );
            Outcome::ArtifactMissing(log)
        }
    }
}
