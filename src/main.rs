//! Entry point wiring CLI dispatch to the service.

use anyhow::Result;
use nlp_service::{cli::Cli, config::Settings, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing()?;
    let settings = Settings::load()?;
    let cli = Cli::parse();

    info!(project = %settings.project_name, ?cli, "starting command");
    cli.dispatch(settings).await
}
