//! HTTP layer exposing the NLP task dispatchers.

pub mod routes;
pub mod types;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{config::Settings, nlp::registry::ModelRegistry};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(settings: Settings, registry: ModelRegistry) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
        }
    }
}

/// All routes with tracing and CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);
    Router::new()
        .route("/ping", get(routes::ping))
        .route("/nlp/models", get(routes::list_models))
        .route("/nlp/translate/:model", post(routes::translate))
        .route("/nlp/entity-recognition", post(routes::entity_recognition))
        .route("/nlp/question-answering", post(routes::question_answering))
        .route("/nlp/zero-shot", post(routes::zero_shot))
        .route("/nlp/binary-zero-shot", post(routes::binary_zero_shot))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `*` opens the API to any origin without credentials; explicit origins
/// allow credentials and mirror the requested methods and headers.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return CorsLayer::new();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub async fn serve(
    settings: Settings,
    registry: ModelRegistry,
    host: String,
    port: u16,
) -> Result<()> {
    let project = settings.project_name.clone();
    let loaded = registry.loaded_tasks();
    let router = router(AppState::new(settings, registry));

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!(%addr, ?loaded, "serving {project} API");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
