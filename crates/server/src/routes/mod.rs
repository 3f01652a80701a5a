use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use shared::ModelRequest;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::pipeline::ServiceError;
use crate::response;
use crate::AppState;

/// Health check
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Model code → built model file
pub async fn create_model(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("create_model", %request_id);

    async move {
        debug!(body = %String::from_utf8_lossy(&body), "Received request body");

        let request: ModelRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejected request body");
                let message = format!("Invalid request body: {}", e);
                return (StatusCode::BAD_REQUEST, message).into_response();
            }
        };
        info!(code_len = request.model_code.len(), "Request decoded");

        // Run detached so a client disconnect does not abort the engine mid-build
        let pipeline = state.pipeline.clone();
        let cancel = state.shutdown.clone();
        let task = tokio::spawn(
            async move { pipeline.run(&request.model_code, &cancel).await }.in_current_span(),
        );

        let format = state.pipeline.format();
        match task.await {
            Ok(Ok(outcome)) => response::build(outcome, format),
            Ok(Err(e)) => e.into_response(),
            Err(e) => ServiceError::Task(e.to_string()).into_response(),
        }
    }
    .instrument(span)
    .await
}
