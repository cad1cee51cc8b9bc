//! Sequence-to-sequence translation: encoder/decoder exports and
//! checkpoint ensembles.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::debug;
use walkdir::WalkDir;

use super::{
    build_session, extract_f32, f32_tensor, i64_tensor, load_tokenizer, read_config, runtime,
    widen,
};
use crate::{
    error::{NlpError, Result},
    nlp::{
        beam::{beam_search, log_softmax, BeamConfig, StepScorer},
        models::{EnsembleTranslator, Translator},
    },
};

const DEFAULT_MAX_LENGTH: usize = 256;

/// Decoding constants read from `config.json`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GenerationConfig {
    decoder_start_token_id: i64,
    eos_token_id: i64,
    pad_token_id: Option<i64>,
    max_length: usize,
    length_penalty: f32,
}

impl GenerationConfig {
    fn from_config(config: &serde_json::Value, path: &Path) -> Result<Self> {
        let int = |key: &str| config.get(key).and_then(|v| v.as_i64());
        let pad_token_id = int("pad_token_id");
        let invalid = |reason: &str| NlpError::InvalidConfig {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        Ok(Self {
            decoder_start_token_id: int("decoder_start_token_id")
                .or(pad_token_id)
                .ok_or_else(|| invalid("missing decoder_start_token_id"))?,
            eos_token_id: int("eos_token_id").ok_or_else(|| invalid("missing eos_token_id"))?,
            pad_token_id,
            max_length: int("max_length")
                .map(|v| v.max(1) as usize)
                .unwrap_or(DEFAULT_MAX_LENGTH),
            length_penalty: config
                .get("length_penalty")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0) as f32,
        })
    }

    fn beam(&self, num_beams: usize) -> BeamConfig {
        BeamConfig {
            num_beams,
            decoder_start_token_id: self.decoder_start_token_id,
            eos_token_id: self.eos_token_id,
            max_length: self.max_length,
            length_penalty: self.length_penalty,
        }
    }

    /// Log-probabilities for one row of logits, never proposing padding.
    fn log_probs(&self, mut logits: Vec<f32>) -> Vec<f32> {
        if let Some(pad) = self.pad_token_id.and_then(|p| usize::try_from(p).ok()) {
            if let Some(slot) = logits.get_mut(pad) {
                *slot = f32::NEG_INFINITY;
            }
        }
        log_softmax(&logits)
    }
}

fn load_generation_config(dir: &Path) -> Result<GenerationConfig> {
    GenerationConfig::from_config(&read_config(dir)?, &dir.join("config.json"))
}

fn encode(tokenizer: &Tokenizer, sentence: &str) -> Result<Vec<i64>> {
    let encoding = tokenizer
        .encode(sentence, true)
        .map_err(|e| NlpError::Tokenizer(e.to_string()))?;
    Ok(widen(encoding.get_ids()))
}

fn decode(tokenizer: &Tokenizer, tokens: &[i64]) -> Result<String> {
    let ids: Vec<u32> = tokens.iter().map(|&t| t as u32).collect();
    tokenizer
        .decode(&ids, true)
        .map_err(|e| NlpError::Tokenizer(e.to_string()))
}

/// Flattened `[batch, cols]` matrix repeating one row.
fn tile<T: Clone>(row: &[T], batch: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(row.len() * batch);
    for _ in 0..batch {
        out.extend_from_slice(row);
    }
    out
}

/// Last-position logits of each batch row from a `[batch, steps, vocab]` output.
fn last_step_rows(shape: &[usize], logits: &[f32]) -> Result<Vec<Vec<f32>>> {
    let &[batch, steps, vocab] = shape else {
        return Err(NlpError::Output(format!("unexpected logits shape {shape:?}")));
    };
    if steps == 0 {
        return Err(NlpError::Output("decoder produced no steps".into()));
    }
    Ok((0..batch)
        .map(|b| {
            let offset = (b * steps + steps - 1) * vocab;
            logits[offset..offset + vocab].to_vec()
        })
        .collect())
}

/// Flatten equal-length prefixes into a `[batch, steps]` tensor.
fn prefix_tensor(prefixes: &[Vec<i64>]) -> Result<ort::value::DynValue> {
    let steps = prefixes.first().map(Vec::len).unwrap_or(0);
    let flat: Vec<i64> = prefixes.iter().flatten().copied().collect();
    i64_tensor(prefixes.len(), steps, flat)
}

/// Encoder/decoder export (`encoder_model.onnx` + `decoder_model.onnx`).
pub struct OnnxTranslator {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    generation: GenerationConfig,
}

impl OnnxTranslator {
    pub fn load(dir: &Path, threads: usize) -> Result<Self> {
        Ok(Self {
            encoder: Mutex::new(build_session(&dir.join("encoder_model.onnx"), threads)?),
            decoder: Mutex::new(build_session(&dir.join("decoder_model.onnx"), threads)?),
            tokenizer: load_tokenizer(dir)?,
            generation: load_generation_config(dir)?,
        })
    }

    fn translate_sentence(&self, sentence: &str, num_beams: usize) -> Result<String> {
        let input_ids = encode(&self.tokenizer, sentence)?;
        let source_len = input_ids.len();
        let attention_mask = vec![1i64; source_len];

        let (hidden_shape, hidden) = {
            let mut encoder = self.encoder.lock().map_err(|_| NlpError::LockPoisoned)?;
            let outputs = encoder
                .run(ort::inputs![
                    "input_ids" => i64_tensor(1, source_len, input_ids)?,
                    "attention_mask" => i64_tensor(1, source_len, attention_mask.clone())?,
                ])
                .map_err(runtime)?;
            extract_f32(outputs.get("last_hidden_state"), "last_hidden_state")?
        };
        let &[_, hidden_len, hidden_dim] = hidden_shape.as_slice() else {
            return Err(NlpError::Output(format!(
                "unexpected encoder shape {hidden_shape:?}"
            )));
        };

        let scorer = DecoderScorer {
            decoder: &self.decoder,
            generation: &self.generation,
            hidden: &hidden,
            hidden_len,
            hidden_dim,
            attention_mask: &attention_mask,
        };
        let tokens = beam_search(&scorer, &self.generation.beam(num_beams))?;
        decode(&self.tokenizer, &tokens)
    }
}

impl Translator for OnnxTranslator {
    fn translate(&self, sentences: &[String], num_beams: usize) -> Result<Vec<String>> {
        sentences
            .iter()
            .map(|sentence| self.translate_sentence(sentence, num_beams))
            .collect()
    }
}

struct DecoderScorer<'a> {
    decoder: &'a Mutex<Session>,
    generation: &'a GenerationConfig,
    hidden: &'a [f32],
    hidden_len: usize,
    hidden_dim: usize,
    attention_mask: &'a [i64],
}

impl StepScorer for DecoderScorer<'_> {
    fn next_log_probs(&self, prefixes: &[Vec<i64>]) -> Result<Vec<Vec<f32>>> {
        let batch = prefixes.len();
        let input_ids = prefix_tensor(prefixes)?;
        let mask = i64_tensor(batch, self.attention_mask.len(), tile(self.attention_mask, batch))?;
        let hidden = f32_tensor(
            (batch, self.hidden_len, self.hidden_dim),
            tile(self.hidden, batch),
        )?;

        let (shape, logits) = {
            let mut decoder = self.decoder.lock().map_err(|_| NlpError::LockPoisoned)?;
            let outputs = decoder
                .run(ort::inputs![
                    "input_ids" => input_ids,
                    "encoder_attention_mask" => mask,
                    "encoder_hidden_states" => hidden,
                ])
                .map_err(runtime)?;
            extract_f32(outputs.get("logits"), "logits")?
        };
        Ok(last_step_rows(&shape, &logits)?
            .into_iter()
            .map(|row| self.generation.log_probs(row))
            .collect())
    }
}

/// Checkpoints sharing one subword codebook; each graph maps
/// `(input_ids, attention_mask, decoder_input_ids)` to logits.
pub struct OnnxEnsembleTranslator {
    checkpoints: Vec<Mutex<Session>>,
    tokenizer: Tokenizer,
    generation: GenerationConfig,
}

impl OnnxEnsembleTranslator {
    pub fn load(dir: &Path, threads: usize) -> Result<Self> {
        let paths = checkpoint_paths(dir)?;
        let tokenizer = load_tokenizer(dir)?;
        let generation = load_generation_config(dir)?;
        let checkpoints = paths
            .iter()
            .map(|path| build_session(path, threads).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;
        debug!(dir = %dir.display(), checkpoints = checkpoints.len(), "loaded ensemble");
        Ok(Self {
            checkpoints,
            tokenizer,
            generation,
        })
    }
}

/// Every `.onnx` file directly inside `dir`, ordered by file name.
pub fn checkpoint_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("onnx"))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(NlpError::MissingArtifact {
            path: dir.join("*.onnx"),
        });
    }
    Ok(paths)
}

impl EnsembleTranslator for OnnxEnsembleTranslator {
    fn translate_one(&self, sentence: &str, num_beams: usize) -> Result<String> {
        let input_ids = encode(&self.tokenizer, sentence)?;
        let scorer = EnsembleScorer {
            ensemble: self,
            source: &input_ids,
        };
        let tokens = beam_search(&scorer, &self.generation.beam(num_beams))?;
        decode(&self.tokenizer, &tokens)
    }
}

struct EnsembleScorer<'a> {
    ensemble: &'a OnnxEnsembleTranslator,
    source: &'a [i64],
}

impl EnsembleScorer<'_> {
    fn checkpoint_rows(
        &self,
        checkpoint: &Mutex<Session>,
        prefixes: &[Vec<i64>],
    ) -> Result<Vec<Vec<f32>>> {
        let batch = prefixes.len();
        let source_len = self.source.len();
        let input_ids = i64_tensor(batch, source_len, tile(self.source, batch))?;
        let mask = i64_tensor(batch, source_len, vec![1; batch * source_len])?;
        let decoder_ids = prefix_tensor(prefixes)?;

        let (shape, logits) = {
            let mut session = checkpoint.lock().map_err(|_| NlpError::LockPoisoned)?;
            let outputs = session
                .run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => mask,
                    "decoder_input_ids" => decoder_ids,
                ])
                .map_err(runtime)?;
            extract_f32(outputs.get("logits"), "logits")?
        };
        Ok(last_step_rows(&shape, &logits)?
            .into_iter()
            .map(|row| self.ensemble.generation.log_probs(row))
            .collect())
    }
}

impl StepScorer for EnsembleScorer<'_> {
    /// Average of the checkpoints' probabilities, in log space.
    fn next_log_probs(&self, prefixes: &[Vec<i64>]) -> Result<Vec<Vec<f32>>> {
        let per_checkpoint = self
            .ensemble
            .checkpoints
            .iter()
            .map(|checkpoint| self.checkpoint_rows(checkpoint, prefixes))
            .collect::<Result<Vec<_>>>()?;
        Ok(average_log_probs(&per_checkpoint))
    }
}

/// `log(mean(exp(x)))` across models for each batch row and token.
fn average_log_probs(per_model: &[Vec<Vec<f32>>]) -> Vec<Vec<f32>> {
    let Some(first) = per_model.first() else {
        return Vec::new();
    };
    let log_n = (per_model.len() as f32).ln();
    (0..first.len())
        .map(|row| {
            (0..first[row].len())
                .map(|token| {
                    let values: Vec<f32> = per_model.iter().map(|m| m[row][token]).collect();
                    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    if max == f32::NEG_INFINITY {
                        return max;
                    }
                    max + values.iter().map(|v| (v - max).exp()).sum::<f32>().ln() - log_n
                })
                .collect()
        })
        .collect()
}
