//! ONNX Runtime backends for every task family.
//!
//! Each model directory is expected to hold a Hugging Face style export:
//! `tokenizer.json`, `config.json` and one or more `.onnx` graphs.

mod question_answering;
mod token_classification;
mod translation;
mod zero_shot;

use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ndarray::{Array2, Array3};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{DynValue, Tensor},
};
use tokenizers::{Encoding, Tokenizer};
use tracing::debug;

use crate::{
    error::{NlpError, Result},
    nlp::{
        models::{
            EnsembleTranslator, QuestionAnswerer, TokenClassifier, Translator, ZeroShotClassifier,
        },
        registry::ModelLoader,
    },
};

pub use question_answering::OnnxQuestionAnswerer;
pub use token_classification::{group_tokens, OnnxTokenClassifier, TokenPrediction};
pub use translation::{OnnxEnsembleTranslator, OnnxTranslator};
pub use zero_shot::OnnxZeroShotClassifier;

/// Builds ONNX-backed handles.
#[derive(Debug, Clone, Copy)]
pub struct OnnxLoader {
    threads: usize,
}

impl OnnxLoader {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

impl ModelLoader for OnnxLoader {
    fn load_ner(&self, path: &Path) -> Result<Arc<dyn TokenClassifier>> {
        Ok(Arc::new(OnnxTokenClassifier::load(path, self.threads)?))
    }

    fn load_question_answering(&self, path: &Path) -> Result<Arc<dyn QuestionAnswerer>> {
        Ok(Arc::new(OnnxQuestionAnswerer::load(path, self.threads)?))
    }

    fn load_zero_shot(&self, path: &Path) -> Result<Arc<dyn ZeroShotClassifier>> {
        Ok(Arc::new(OnnxZeroShotClassifier::load(path, self.threads)?))
    }

    fn load_translation(&self, path: &Path) -> Result<Arc<dyn Translator>> {
        Ok(Arc::new(OnnxTranslator::load(path, self.threads)?))
    }

    fn load_ensemble(&self, path: &Path) -> Result<Option<Arc<dyn EnsembleTranslator>>> {
        Ok(Some(Arc::new(OnnxEnsembleTranslator::load(
            path,
            self.threads,
        )?)))
    }
}

fn runtime(err: impl Display) -> NlpError {
    NlpError::Inference(err.to_string())
}

fn require_file(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(NlpError::MissingArtifact { path })
    }
}

fn build_session(path: &Path, threads: usize) -> Result<Session> {
    let path = require_file(path.to_path_buf())?;
    let session = Session::builder()
        .map_err(runtime)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(runtime)?
        .with_intra_threads(threads)
        .map_err(runtime)?
        .commit_from_file(&path)
        .map_err(runtime)?;
    debug!(path = %path.display(), "created onnx session");
    Ok(session)
}

fn load_tokenizer(dir: &Path) -> Result<Tokenizer> {
    let path = require_file(dir.join("tokenizer.json"))?;
    Tokenizer::from_file(&path).map_err(|e| NlpError::Tokenizer(e.to_string()))
}

fn read_config(dir: &Path) -> Result<serde_json::Value> {
    let path = require_file(dir.join("config.json"))?;
    let raw = std::fs::read_to_string(&path).map_err(|source| NlpError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| NlpError::InvalidConfig {
        path,
        reason: e.to_string(),
    })
}

/// `id2label` from a Hugging Face config, keyed by class index.
fn id_to_label(config: &serde_json::Value) -> HashMap<usize, String> {
    config
        .get("id2label")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(id, label)| Some((id.parse().ok()?, label.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn i64_tensor(rows: usize, cols: usize, data: Vec<i64>) -> Result<DynValue> {
    let array = Array2::from_shape_vec((rows, cols), data).map_err(runtime)?;
    Ok(Tensor::from_array(array).map_err(runtime)?.into_dyn())
}

fn f32_tensor(shape: (usize, usize, usize), data: Vec<f32>) -> Result<DynValue> {
    let array = Array3::from_shape_vec(shape, data).map_err(runtime)?;
    Ok(Tensor::from_array(array).map_err(runtime)?.into_dyn())
}

/// Copy a named float output out of the session's borrowed buffers.
fn extract_f32(value: Option<&DynValue>, name: &str) -> Result<(Vec<usize>, Vec<f32>)> {
    let value = value.ok_or_else(|| NlpError::Output(format!("missing output {name:?}")))?;
    let (shape, data) = value.try_extract_tensor::<f32>().map_err(runtime)?;
    Ok((shape.iter().map(|&d| d as usize).collect(), data.to_vec()))
}

fn widen(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}

/// Encoder-only transformer fed from a tokenizer encoding.
struct EncoderModel {
    session: Mutex<Session>,
    wants_token_types: bool,
}

impl EncoderModel {
    fn load(path: &Path, threads: usize) -> Result<Self> {
        let session = build_session(path, threads)?;
        let wants_token_types = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");
        Ok(Self {
            session: Mutex::new(session),
            wants_token_types,
        })
    }

    /// Run a single encoding and copy out the requested outputs in order.
    fn run(&self, encoding: &Encoding, names: &[&str]) -> Result<Vec<(Vec<usize>, Vec<f32>)>> {
        let seq_len = encoding.get_ids().len();
        let input_ids = i64_tensor(1, seq_len, widen(encoding.get_ids()))?;
        let attention_mask = i64_tensor(1, seq_len, widen(encoding.get_attention_mask()))?;

        let mut session = self.session.lock().map_err(|_| NlpError::LockPoisoned)?;
        let outputs = if self.wants_token_types {
            let token_type_ids = i64_tensor(1, seq_len, widen(encoding.get_type_ids()))?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
            ])
        }
        .map_err(runtime)?;

        names
            .iter()
            .map(|name| extract_f32(outputs.get(*name), name))
            .collect()
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// Characters `start..end` of `text`, counted in chars.
fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_and_argmax_agree() {
        let probs = softmax(&[0.5, 2.0, -1.0]);
        assert_eq!(argmax(&probs), 1);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn labels_come_from_config() {
        let config = serde_json::json!({"id2label": {"0": "O", "1": "B-PER", "x": "bad"}});
        let labels = id_to_label(&config);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[&1], "B-PER");
    }

    #[test]
    fn char_slice_counts_chars() {
        assert_eq!(char_slice("Zoë Ødegaard", 4, 12), "Ødegaard");
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxLoader::new(1).load_ner(dir.path()).err().unwrap();
        assert!(matches!(err, NlpError::MissingArtifact { .. }));
    }
}
