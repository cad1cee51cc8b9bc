//! Capability traits implemented by every model backend, plus the
//! task-shaped values they exchange.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Labelled region of a document produced by entity recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub entity_group: String,
    pub word: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
}

/// Extractive question answering request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaInput {
    pub question: String,
    pub context: String,
}

/// Best answer span located in the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub score: f64,
    pub start: usize,
    pub end: usize,
    pub answer: String,
}

/// Raw zero-shot output for one document, labels sorted by descending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroShotOutput {
    pub sequence: String,
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

/// Token classification model with word grouping applied.
pub trait TokenClassifier: Send + Sync {
    fn classify(&self, documents: &[String]) -> Result<Vec<Vec<EntitySpan>>>;
}

pub trait QuestionAnswerer: Send + Sync {
    fn answer(&self, input: &QaInput) -> Result<QaAnswer>;
}

/// Entailment-based classifier scoring documents against free-form topics.
///
/// With a single topic each score is an independent entailment probability;
/// with several topics the scores of a document sum to one.
pub trait ZeroShotClassifier: Send + Sync {
    fn classify(&self, documents: &[String], topics: &[String]) -> Result<Vec<ZeroShotOutput>>;
}

/// Pipeline-style translator able to process a batch of sentences.
pub trait Translator: Send + Sync {
    fn translate(&self, sentences: &[String], num_beams: usize) -> Result<Vec<String>>;
}

/// Checkpoint ensemble that can only translate one sentence per call.
pub trait EnsembleTranslator: Send + Sync {
    fn translate_one(&self, sentence: &str, num_beams: usize) -> Result<String>;
}

/// The two translation model representations.
#[derive(Clone)]
pub enum TranslationHandle {
    Standard(Arc<dyn Translator>),
    Ensemble(Arc<dyn EnsembleTranslator>),
}

impl TranslationHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Standard(_) => "standard",
            Self::Ensemble(_) => "ensemble",
        }
    }

    /// Translate independent lines, batching where the representation allows it.
    pub fn translate_lines(&self, lines: &[String], num_beams: usize) -> Result<Vec<String>> {
        match self {
            Self::Standard(model) => model.translate(lines, num_beams),
            Self::Ensemble(model) => lines
                .iter()
                .map(|line| model.translate_one(line, num_beams))
                .collect(),
        }
    }
}

impl std::fmt::Debug for TranslationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TranslationHandle").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Upper {
        batches: Mutex<Vec<usize>>,
    }

    impl Translator for Upper {
        fn translate(&self, sentences: &[String], _num_beams: usize) -> Result<Vec<String>> {
            self.batches.lock().unwrap().push(sentences.len());
            Ok(sentences.iter().map(|s| s.to_uppercase()).collect())
        }
    }

    struct Reverse;

    impl EnsembleTranslator for Reverse {
        fn translate_one(&self, sentence: &str, num_beams: usize) -> Result<String> {
            Ok(format!("{}:{num_beams}", sentence.chars().rev().collect::<String>()))
        }
    }

    #[test]
    fn standard_handle_batches_lines() {
        let model = Arc::new(Upper {
            batches: Mutex::new(Vec::new()),
        });
        let handle = TranslationHandle::Standard(model.clone());
        let lines = vec!["a".to_string(), "b".to_string()];
        assert_eq!(handle.translate_lines(&lines, 4).unwrap(), vec!["A", "B"]);
        assert_eq!(*model.batches.lock().unwrap(), vec![2]);
    }

    #[test]
    fn ensemble_handle_translates_per_line() {
        let handle = TranslationHandle::Ensemble(Arc::new(Reverse));
        let lines = vec!["ab".to_string(), "cd".to_string()];
        assert_eq!(
            handle.translate_lines(&lines, 2).unwrap(),
            vec!["ba:2", "dc:2"]
        );
        assert_eq!(handle.kind(), "ensemble");
    }
}
