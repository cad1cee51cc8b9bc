//! Error types for model loading and inference.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by model backends.
#[derive(Debug, Error)]
pub enum NlpError {
    #[error("model artefact missing: {path}")]
    MissingArtifact { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model config {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: {0}")]
    Output(String),

    #[error("inference session lock poisoned")]
    LockPoisoned,

    #[error("{task} models are not supported by this build")]
    Unsupported { task: String },
}

pub type Result<T, E = NlpError> = std::result::Result<T, E>;
