//! Command-line interface wiring for nlp-service.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Settings;

pub mod models;
pub mod serve;
pub mod translate;

/// Top-level CLI definition.
#[derive(Debug, Parser)]
#[command(author, version, about = "NLP model inference service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Dispatch the selected sub-command.
    pub async fn dispatch(self, settings: Settings) -> Result<()> {
        match self.command {
            Commands::Serve(args) => serve::run(args, settings).await,
            Commands::Models => models::run(settings).await,
            Commands::Translate(args) => translate::run(args, settings).await,
        }
    }
}

/// Supported sub-commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load the configured models and serve the HTTP API.
    Serve(serve::Args),
    /// List model directories under the model root.
    Models,
    /// Translate text with a configured translation variant.
    Translate(translate::Args),
}
