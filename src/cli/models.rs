//! CLI entry-point listing model directories.

use anyhow::Result;
use tracing::instrument;

use crate::{api::routes::list_model_dirs, config::Settings};

#[instrument(skip(settings))]
pub async fn run(settings: Settings) -> Result<()> {
    for name in list_model_dirs(&settings.nlp_root) {
        println!("{name}");
    }
    Ok(())
}
