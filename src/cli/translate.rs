//! CLI entry-point for one-off translations.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use crate::{
    api::types::NOT_LOADED,
    config::{Settings, TranslationEntry},
    nlp::{self, beam::MAX_NUM_BEAMS, registry::ModelRegistry, Dispatch},
};

use super::serve::build_registry;

/// Args for the `translate` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Translation variant, i.e. a directory name under the model root.
    #[arg(long)]
    pub model: String,
    /// Beam width.
    #[arg(
        long,
        default_value_t = 50,
        value_parser = clap::value_parser!(u16).range(1..=MAX_NUM_BEAMS as i64)
    )]
    pub num_beams: u16,
    /// Text to translate; read from stdin when omitted.
    pub text: Option<String>,
}

#[instrument(skip(settings), fields(model = %args.model))]
pub async fn run(args: Args, mut settings: Settings) -> Result<()> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading text from stdin")?;
            buf
        }
    };

    // Only the requested variant is loaded.
    let selected: Vec<TranslationEntry> = settings
        .models
        .translation
        .iter()
        .filter(|entry| entry.variant == args.model)
        .cloned()
        .collect();
    settings.models.translation = selected;
    settings.models.ner.load = false;
    settings.models.question_answering.load = false;
    settings.models.zero_shot.load = false;
    let registry: ModelRegistry = build_registry(&settings).await?;

    let model = args.model.clone();
    let num_beams = usize::from(args.num_beams);
    let outcome =
        tokio::task::spawn_blocking(move || nlp::translate(&registry, &model, &text, num_beams))
            .await??;
    match outcome {
        Dispatch::Completed(translation) => {
            info!(chars = translation.len(), "translated");
            println!("{translation}");
        }
        Dispatch::NotLoaded => println!("{NOT_LOADED}"),
    }
    Ok(())
}
