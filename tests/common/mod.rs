//! Fake model backends injected through `ModelLoader`.
#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use nlp_service::{
    config::{ModelEntry, ModelSettings, TranslationEntry},
    error::{NlpError, Result},
    nlp::{
        models::{
            EnsembleTranslator, EntitySpan, QaAnswer, QaInput, QuestionAnswerer, TokenClassifier,
            Translator, ZeroShotClassifier, ZeroShotOutput,
        },
        registry::ModelLoader,
    },
};

pub fn span(group: &str, word: &str, start: usize, end: usize, score: f64) -> EntitySpan {
    EntitySpan {
        entity_group: group.into(),
        word: word.into(),
        start,
        end,
        score,
    }
}

/// Emits sub-word spans that still need merging.
pub struct FakeNer;

impl TokenClassifier for FakeNer {
    fn classify(&self, documents: &[String]) -> Result<Vec<Vec<EntitySpan>>> {
        Ok(documents
            .iter()
            .map(|_| {
                vec![
                    span("PER", "Ali", 0, 3, 0.8),
                    span("PER", "ce", 3, 5, 0.9),
                    span("LOC", "home", 11, 15, 0.7),
                ]
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeQa {
    pub calls: AtomicUsize,
}

impl FakeQa {
    pub fn answer_for(input: &QaInput) -> QaAnswer {
        QaAnswer {
            score: 0.93,
            start: 0,
            end: 5,
            answer: input.context.chars().take(5).collect(),
        }
    }
}

impl QuestionAnswerer for FakeQa {
    fn answer(&self, input: &QaInput) -> Result<QaAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::answer_for(input))
    }
}

/// Scores topics 0.7, 0.3 in order; a single topic gets 0.6.
pub struct FakeZeroShot;

impl ZeroShotClassifier for FakeZeroShot {
    fn classify(&self, documents: &[String], topics: &[String]) -> Result<Vec<ZeroShotOutput>> {
        let scores: Vec<f64> = match topics.len() {
            1 => vec![0.6],
            _ => vec![0.7, 0.3],
        };
        Ok(documents
            .iter()
            .map(|doc| ZeroShotOutput {
                sequence: doc.clone(),
                labels: topics.iter().take(scores.len()).cloned().collect(),
                scores: scores.clone(),
            })
            .collect())
    }
}

/// Upper-cases each sentence.
#[derive(Default)]
pub struct FakeTranslator {
    pub calls: AtomicUsize,
}

impl Translator for FakeTranslator {
    fn translate(&self, sentences: &[String], _num_beams: usize) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(sentences.iter().map(|s| s.to_uppercase()).collect())
    }
}

/// Reverses each sentence.
pub struct FakeEnsemble;

impl EnsembleTranslator for FakeEnsemble {
    fn translate_one(&self, sentence: &str, _num_beams: usize) -> Result<String> {
        Ok(sentence.chars().rev().collect())
    }
}

/// Loader returning fakes; ensembles can be made to fail.
#[derive(Default)]
pub struct FakeLoader {
    pub qa: Arc<FakeQa>,
    pub translator: Arc<FakeTranslator>,
    pub fail_ensemble: bool,
    pub fail_ner: bool,
}

impl ModelLoader for FakeLoader {
    fn load_ner(&self, path: &Path) -> Result<Arc<dyn TokenClassifier>> {
        if self.fail_ner {
            return Err(NlpError::MissingArtifact {
                path: path.join("model.onnx"),
            });
        }
        Ok(Arc::new(FakeNer))
    }

    fn load_question_answering(&self, _path: &Path) -> Result<Arc<dyn QuestionAnswerer>> {
        Ok(self.qa.clone())
    }

    fn load_zero_shot(&self, _path: &Path) -> Result<Arc<dyn ZeroShotClassifier>> {
        Ok(Arc::new(FakeZeroShot))
    }

    fn load_translation(&self, _path: &Path) -> Result<Arc<dyn Translator>> {
        Ok(self.translator.clone())
    }

    fn load_ensemble(&self, path: &Path) -> Result<Option<Arc<dyn EnsembleTranslator>>> {
        if self.fail_ensemble {
            return Err(NlpError::MissingArtifact {
                path: path.join("*.onnx"),
            });
        }
        Ok(Some(Arc::new(FakeEnsemble)))
    }
}

/// Model directories under `root`: `standard` has an encoder export,
/// `ensemble` only checkpoints.
pub fn model_settings(root: &Path, load: bool) -> ModelSettings {
    for dir in ["ner", "question-answering", "zero-shot", "standard", "ensemble"] {
        std::fs::create_dir_all(root.join(dir)).unwrap();
    }
    std::fs::write(root.join("standard").join("encoder_model.onnx"), b"").unwrap();
    std::fs::write(root.join("ensemble").join("checkpoint1.onnx"), b"").unwrap();

    let translation = ["standard", "ensemble"]
        .into_iter()
        .map(|variant| TranslationEntry {
            variant: variant.to_string(),
            entry: ModelEntry::new(root.join(variant), load),
        })
        .collect();
    ModelSettings {
        ner: ModelEntry::new(root.join("ner"), load),
        question_answering: ModelEntry::new(root.join("question-answering"), load),
        zero_shot: ModelEntry::new(root.join("zero-shot"), load),
        translation,
    }
}
