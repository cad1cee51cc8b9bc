//! Zero-shot classification through natural language inference.

use std::{cmp::Ordering, path::Path};

use tokenizers::Tokenizer;

use super::{id_to_label, load_tokenizer, read_config, softmax, EncoderModel};
use crate::{
    error::{NlpError, Result},
    nlp::models::{ZeroShotClassifier, ZeroShotOutput},
};

const HYPOTHESIS_TEMPLATE: &str = "This example is {}.";

pub struct OnnxZeroShotClassifier {
    model: EncoderModel,
    tokenizer: Tokenizer,
    entailment: usize,
    contradiction: usize,
}

impl OnnxZeroShotClassifier {
    pub fn load(dir: &Path, threads: usize) -> Result<Self> {
        let model = EncoderModel::load(&dir.join("model.onnx"), threads)?;
        let tokenizer = load_tokenizer(dir)?;
        let labels = id_to_label(&read_config(dir)?);
        let find = |prefix: &str| {
            labels
                .iter()
                .find(|(_, label)| label.to_ascii_lowercase().starts_with(prefix))
                .map(|(&id, _)| id)
                .ok_or_else(|| NlpError::InvalidConfig {
                    path: dir.join("config.json"),
                    reason: format!("no {prefix}* label in id2label"),
                })
        };
        Ok(Self {
            entailment: find("entail")?,
            contradiction: find("contradict")?,
            model,
            tokenizer,
        })
    }

    /// `(contradiction, entailment)` logits for a premise/hypothesis pair.
    fn nli_logits(&self, premise: &str, topic: &str) -> Result<(f32, f32)> {
        let hypothesis = HYPOTHESIS_TEMPLATE.replace("{}", topic);
        let encoding = self
            .tokenizer
            .encode((premise, hypothesis.as_str()), true)
            .map_err(|e| NlpError::Tokenizer(e.to_string()))?;
        let mut outputs = self.model.run(&encoding, &["logits"])?;
        let (_, logits) = outputs.remove(0);
        match (logits.get(self.contradiction), logits.get(self.entailment)) {
            (Some(&c), Some(&e)) => Ok((c, e)),
            _ => Err(NlpError::Output(format!(
                "nli logits too short: {} classes",
                logits.len()
            ))),
        }
    }

    fn classify_one(&self, document: &str, topics: &[String]) -> Result<ZeroShotOutput> {
        let pairs = topics
            .iter()
            .map(|topic| self.nli_logits(document, topic))
            .collect::<Result<Vec<_>>>()?;
        let scores: Vec<f32> = if pairs.len() == 1 {
            pairs.iter().map(|&(c, e)| softmax(&[c, e])[1]).collect()
        } else {
            softmax(&pairs.iter().map(|&(_, e)| e).collect::<Vec<_>>())
        };
        Ok(rank(document, topics, &scores))
    }
}

impl ZeroShotClassifier for OnnxZeroShotClassifier {
    fn classify(&self, documents: &[String], topics: &[String]) -> Result<Vec<ZeroShotOutput>> {
        documents
            .iter()
            .map(|doc| self.classify_one(doc, topics))
            .collect()
    }
}

/// Pair topics with scores, highest first.
fn rank(document: &str, topics: &[String], scores: &[f32]) -> ZeroShotOutput {
    let mut ranked: Vec<(&String, f64)> = topics
        .iter()
        .zip(scores.iter().map(|&s| s as f64))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ZeroShotOutput {
        sequence: document.to_string(),
        labels: ranked.iter().map(|(label, _)| (*label).clone()).collect(),
        scores: ranked.iter().map(|(_, score)| *score).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_descending() {
        let topics = vec!["sport".to_string(), "politics".to_string()];
        let out = rank("doc", &topics, &[0.25, 0.75]);
        assert_eq!(out.labels, vec!["politics", "sport"]);
        assert_eq!(out.scores, vec![0.75, 0.25]);
        assert_eq!(out.sequence, "doc");
    }
}
