//! Token classification (NER) with simple word grouping.

use std::{collections::HashMap, path::Path};

use tokenizers::Tokenizer;

use super::{argmax, char_slice, id_to_label, load_tokenizer, read_config, softmax, EncoderModel};
use crate::{
    error::{NlpError, Result},
    nlp::models::{EntitySpan, TokenClassifier},
};

/// Per-token prediction with character offsets into the document.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPrediction {
    pub label: String,
    pub score: f32,
    pub start: usize,
    pub end: usize,
}

pub struct OnnxTokenClassifier {
    model: EncoderModel,
    tokenizer: Tokenizer,
    id_to_label: HashMap<usize, String>,
}

impl OnnxTokenClassifier {
    pub fn load(dir: &Path, threads: usize) -> Result<Self> {
        let model = EncoderModel::load(&dir.join("model.onnx"), threads)?;
        let tokenizer = load_tokenizer(dir)?;
        let config = read_config(dir)?;
        let id_to_label = id_to_label(&config);
        if id_to_label.is_empty() {
            return Err(NlpError::InvalidConfig {
                path: dir.join("config.json"),
                reason: "id2label is empty".into(),
            });
        }
        Ok(Self {
            model,
            tokenizer,
            id_to_label,
        })
    }

    fn classify_one(&self, text: &str) -> Result<Vec<EntitySpan>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let encoding = self
            .tokenizer
            .encode_char_offsets(text, true)
            .map_err(|e| NlpError::Tokenizer(e.to_string()))?;
        let mut outputs = self.model.run(&encoding, &["logits"])?;
        let (shape, logits) = outputs.remove(0);
        let &[_, seq_len, num_labels] = shape.as_slice() else {
            return Err(NlpError::Output(format!("unexpected logits shape {shape:?}")));
        };

        let special = encoding.get_special_tokens_mask();
        let offsets = encoding.get_offsets();
        let predictions = (0..seq_len.min(offsets.len()))
            .filter(|&idx| special.get(idx) != Some(&1) && offsets[idx].0 < offsets[idx].1)
            .map(|idx| {
                let probs = softmax(&logits[idx * num_labels..(idx + 1) * num_labels]);
                let best = argmax(&probs);
                TokenPrediction {
                    label: self
                        .id_to_label
                        .get(&best)
                        .cloned()
                        .unwrap_or_else(|| format!("LABEL_{best}")),
                    score: probs[best],
                    start: offsets[idx].0,
                    end: offsets[idx].1,
                }
            })
            .collect::<Vec<_>>();

        Ok(group_tokens(&predictions, text))
    }
}

impl TokenClassifier for OnnxTokenClassifier {
    fn classify(&self, documents: &[String]) -> Result<Vec<Vec<EntitySpan>>> {
        documents.iter().map(|doc| self.classify_one(doc)).collect()
    }
}

fn split_tag(label: &str) -> (bool, &str) {
    if let Some(tag) = label.strip_prefix("B-") {
        (true, tag)
    } else if let Some(tag) = label.strip_prefix("I-") {
        (false, tag)
    } else {
        (false, label)
    }
}

/// Group consecutive tokens into entity spans.
///
/// A `B-` tag or a change of tag opens a new group. `O` groups are dropped.
/// The group score is the mean token score.
pub fn group_tokens(tokens: &[TokenPrediction], text: &str) -> Vec<EntitySpan> {
    let mut groups: Vec<(&str, Vec<&TokenPrediction>)> = Vec::new();
    for token in tokens {
        let (begins, tag) = split_tag(&token.label);
        let continues = !begins && matches!(groups.last(), Some((last, _)) if *last == tag);
        match groups.last_mut() {
            Some((_, members)) if continues => members.push(token),
            _ => {}
        }
        if !continues {
            groups.push((tag, vec![token]));
        }
    }

    groups
        .into_iter()
        .filter(|(tag, _)| *tag != "O")
        .filter_map(|(tag, members)| {
            let first = members.first()?;
            let last = members.last()?;
            let score =
                members.iter().map(|t| t.score as f64).sum::<f64>() / members.len() as f64;
            Some(EntitySpan {
                entity_group: tag.to_string(),
                word: char_slice(text, first.start, last.end),
                start: first.start,
                end: last.end,
                score,
            })
        })
        .collect()
}
