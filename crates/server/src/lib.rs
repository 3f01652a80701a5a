//! Model build service: `POST /create_model` renders the caller's model code into
//! an engine script, runs the engine headless and returns the built model file.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod classify;
pub mod config;
pub mod invoke;
pub mod pipeline;
pub mod render;
pub mod response;
pub mod routes;

use config::ServerConfig;
use invoke::EngineInvoker;
use pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Cancelled on server shutdown; running engines are killed.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        invoker: Arc<dyn EngineInvoker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(config, invoker)),
            shutdown,
        }
    }
}

pub fn app(config: &ServerConfig, state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/create_model", post(routes::create_model))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
