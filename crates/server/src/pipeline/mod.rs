//! One request's render → invoke → classify run.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use shared::OutputFormat;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{classify, Outcome};
use crate::config::ServerConfig;
use crate::invoke::{EngineInvoker, InvokeError};
use crate::render::{render, RenderContext, RenderError, Template};

/// Operational faults. None of these are the caller's fault and none carry an engine log.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to allocate request workspace: {0}")]
    Workspace(#[source] io::Error),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("pipeline task failed: {0}")]
    Task(String),
}

impl ServiceError {
    /// Message safe to return to the caller (no paths).
    pub fn public_message(&self) -> &'static str {
        match self {
            ServiceError::Workspace(_) | ServiceError::Invoke(_) => "Internal server error",
            ServiceError::Render(_) => "Error parsing templates",
            ServiceError::Task(_) => "Internal server error",
        }
    }
}

pub struct Pipeline {
    template_dir: PathBuf,
    scratch_dir: PathBuf,
    format: OutputFormat,
    invoker: Arc<dyn EngineInvoker>,
}

impl Pipeline {
    pub fn new(config: &ServerConfig, invoker: Arc<dyn EngineInvoker>) -> Self {
        Self {
            template_dir: config.template_dir.clone(),
            scratch_dir: config.scratch_dir.clone(),
            format: config.output_format,
            invoker,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub async fn run(
        &self,
        model_code: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ServiceError> {
        // Fresh directory per request keeps the output path unique
        let workspace = tempfile::Builder::new()
            .prefix("model_")
            .tempdir_in(&self.scratch_dir)
            .map_err(ServiceError::Workspace)?;
        let output_path = workspace
            .path()
            .join(format!("model.{}", self.format.extension()));
        debug!(path = %output_path.display(), "Using output path");

        let template = Template::load(&self.template_dir, self.format.template_name()).await?;
        let script = render(
            &template,
            RenderContext {
                model_code,
                output_path: &output_path,
            },
        )?;
        debug!(template = template.name(), "Script rendered");

        let result = self.invoker.invoke(&script, cancel).await?;
        let exit = result.exit.clone();
        let outcome = classify(result, &output_path).await;

        match &outcome {
            Outcome::Success(bytes) => info!(%exit, size = bytes.len(), "Model built"),
            other => warn!(
                %exit,
                outcome = other.label(),
                log = other.log().unwrap_or_default(),
                "Model build failed"
            ),
        }

        if let Err(e) = workspace.close() {
            warn!(error = %e, "Failed to remove request workspace");
        }
        Ok(outcome)
    }
}
