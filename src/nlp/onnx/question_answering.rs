//! Extractive question answering over start/end logits.

use std::path::Path;

use tokenizers::Tokenizer;

use super::{char_slice, load_tokenizer, softmax, EncoderModel};
use crate::{
    error::{NlpError, Result},
    nlp::models::{QaAnswer, QaInput, QuestionAnswerer},
};

/// Longest answer, in tokens.
const MAX_ANSWER_TOKENS: usize = 15;

pub struct OnnxQuestionAnswerer {
    model: EncoderModel,
    tokenizer: Tokenizer,
}

impl OnnxQuestionAnswerer {
    pub fn load(dir: &Path, threads: usize) -> Result<Self> {
        Ok(Self {
            model: EncoderModel::load(&dir.join("model.onnx"), threads)?,
            tokenizer: load_tokenizer(dir)?,
        })
    }
}

impl QuestionAnswerer for OnnxQuestionAnswerer {
    fn answer(&self, input: &QaInput) -> Result<QaAnswer> {
        let encoding = self
            .tokenizer
            .encode_char_offsets((input.question.as_str(), input.context.as_str()), true)
            .map_err(|e| NlpError::Tokenizer(e.to_string()))?;
        let outputs = self.model.run(&encoding, &["start_logits", "end_logits"])?;
        let (start_logits, end_logits) = match outputs.as_slice() {
            [(_, start), (_, end)] => (start, end),
            _ => return Err(NlpError::Output("expected start and end logits".into())),
        };

        let context_mask: Vec<bool> = encoding
            .get_sequence_ids()
            .into_iter()
            .map(|seq| seq == Some(1))
            .collect();
        let offsets = encoding.get_offsets();
        let Some((start_tok, end_tok, score)) =
            best_span(start_logits, end_logits, &context_mask, MAX_ANSWER_TOKENS)
        else {
            return Ok(QaAnswer {
                score: 0.0,
                start: 0,
                end: 0,
                answer: String::new(),
            });
        };

        let start = offsets[start_tok].0;
        let end = offsets[end_tok].1;
        Ok(QaAnswer {
            score,
            start,
            end,
            answer: char_slice(&input.context, start, end),
        })
    }
}

/// Highest scoring `(start, end, probability)` restricted to context tokens.
fn best_span(
    start_logits: &[f32],
    end_logits: &[f32],
    context_mask: &[bool],
    max_len: usize,
) -> Option<(usize, usize, f64)> {
    let n = context_mask
        .len()
        .min(start_logits.len())
        .min(end_logits.len());
    let masked = |logits: &[f32]| -> Vec<f32> {
        (0..n)
            .map(|i| if context_mask[i] { logits[i] } else { f32::NEG_INFINITY })
            .collect()
    };
    if !context_mask[..n].iter().any(|&m| m) {
        return None;
    }
    let p_start = softmax(&masked(start_logits));
    let p_end = softmax(&masked(end_logits));

    let mut best: Option<(usize, usize, f64)> = None;
    for s in (0..n).filter(|&s| context_mask[s]) {
        for e in (s..n.min(s + max_len)).filter(|&e| context_mask[e]) {
            let score = p_start[s] as f64 * p_end[e] as f64;
            if best.map_or(true, |(_, _, b)| score > b) {
                best = Some((s, e, score));
            }
        }
    }
    best
}
