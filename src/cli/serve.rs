//! CLI entry-point for serving the HTTP API.

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{
    api,
    config::Settings,
    nlp::registry::{default_loader, ModelRegistry},
};

/// Run the Axum server.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Port to bind (default 8080).
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    /// Host address, defaults to localhost.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let registry = build_registry(&settings).await?;
    api::serve(settings, registry, args.host, args.port).await
}

/// Load every enabled model on the blocking pool.
pub async fn build_registry(settings: &Settings) -> Result<ModelRegistry> {
    let models = settings.models.clone();
    let threads = settings.inference_threads;
    tokio::task::spawn_blocking(move || {
        let loader = default_loader(threads);
        ModelRegistry::build(&models, loader.as_ref())
    })
    .await?
}
