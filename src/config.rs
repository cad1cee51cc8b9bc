//! Runtime configuration utilities for nlp-service.

use std::{env, path::PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

/// Configuration entry for a single model directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelEntry {
    /// Directory holding the model artefacts.
    pub path: PathBuf,
    /// Whether the model should be loaded at startup.
    pub load: bool,
}

impl ModelEntry {
    pub fn new(path: impl Into<PathBuf>, load: bool) -> Self {
        Self {
            path: path.into(),
            load,
        }
    }

    /// A handle is only constructed when enabled and the directory exists.
    pub fn is_available(&self) -> bool {
        self.load && self.path.is_dir()
    }
}

/// Named translation variant, e.g. `opus-mt-en-de`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranslationEntry {
    pub variant: String,
    #[serde(flatten)]
    pub entry: ModelEntry,
}

/// Table of every model the registry may load.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub ner: ModelEntry,
    pub question_answering: ModelEntry,
    pub zero_shot: ModelEntry,
    pub translation: Vec<TranslationEntry>,
}

/// Application configuration resolved from `.env` and defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Display name used in the startup banner.
    pub project_name: String,
    /// Root folder scanned by `/nlp/models`.
    pub nlp_root: PathBuf,
    /// Origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
    /// Intra-op threads for each inference session.
    pub inference_threads: usize,
    pub models: ModelSettings,
}

impl Settings {
    /// Load configuration from environment with reasonable defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_name = lookup("PROJECT_NAME").unwrap_or_else(|| "nlp-service".to_string());
        let nlp_root = lookup("NLP_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./models"));
        let cors_origins = lookup("BACKEND_CORS_ORIGINS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        let inference_threads = match lookup("INFERENCE_THREADS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("INFERENCE_THREADS is not a number: {raw}"))?,
            None => 4,
        };

        let entry = |prefix: &str, default_dir: &str| -> anyhow::Result<ModelEntry> {
            let path = lookup(&format!("{prefix}_PATH"))
                .map(PathBuf::from)
                .unwrap_or_else(|| nlp_root.join(default_dir));
            let load = parse_flag(&lookup, &format!("{prefix}_LOAD"), true)?;
            Ok(ModelEntry::new(path, load))
        };

        let ner = entry("NER_MODEL", "ner")?;
        let question_answering = entry("QA_MODEL", "question-answering")?;
        let zero_shot = entry("ZS_MODEL", "zero-shot")?;

        let translation_load = parse_flag(&lookup, "TRANSLATION_MODELS_LOAD", true)?;
        let translation = lookup("TRANSLATION_MODELS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default()
            .into_iter()
            .map(|variant| TranslationEntry {
                entry: ModelEntry::new(nlp_root.join(&variant), translation_load),
                variant,
            })
            .collect();

        Ok(Self {
            project_name,
            nlp_root,
            cors_origins,
            inference_threads,
            models: ModelSettings {
                ner,
                question_answering,
                zero_shot,
                translation,
            },
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> anyhow::Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key} must be a boolean, got {other:?}"),
    }
}
