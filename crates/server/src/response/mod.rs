//! HTTP responses for each pipeline result.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use shared::{ErrorResponse, OutputFormat};
use tracing::error;

use crate::classify::Outcome;
use crate::invoke::ExitKind;
use crate::pipeline::ServiceError;

const NO_VALID_FILE_HINT: &str = "The engine completed but did not generate a valid model file. \
This typically indicates an error in the model code.";

/// Status code for an outcome. Failing to start the engine is an environment
/// fault (500); everything else the engine does wrong is blamed on the model code (422).
pub fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Success(_) => StatusCode::OK,
        Outcome::ProcessFailed {
            failure: ExitKind::SpawnFailed { .. },
            ..
        } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub fn build(outcome: Outcome, format: OutputFormat) -> Response {
    let status = status_for(&outcome);
    let body = match outcome {
        Outcome::Success(bytes) => return artifact_response(bytes, format),
        Outcome::ProcessFailed { failure, log } => {
            let error = match &failure {
                ExitKind::SpawnFailed { .. } => "Engine could not be started",
                ExitKind::TimedOut { .. } => "Engine timed out",
                ExitKind::Cancelled => "Engine run cancelled",
                _ => "Engine render failed",
            };
            ErrorResponse::new(error)
                .with_log(log)
                .with_exit(failure.to_string())
        }
        Outcome::EngineReportedError(log) => ErrorResponse::new("Engine render failed")
            .with_log(log)
            .with_exit(ExitKind::Success.to_string()),
        Outcome::ArtifactMissing(log) => ErrorResponse::new(format!(
            "Failed to generate {} file",
            format.extension().to_uppercase()
        ))
        .with_details(NO_VALID_FILE_HINT)
        .with_log(log),
        Outcome::ArtifactEmpty(log) => ErrorResponse::new(format!(
            "Generated {} file is empty",
            format.extension().to_uppercase()
        ))
        .with_details(NO_VALID_FILE_HINT)
        .with_log(log),
    };
    (status, Json(body)).into_response()
}

fn artifact_response(bytes: Vec<u8>, format: OutputFormat) -> Response {
    let len = bytes.len();
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.content_type())),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static(format.content_disposition()),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        bytes,
    )
        .into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        error!(error = %self, "Internal error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(self.public_message())),
        )
            .into_response()
    }
}
