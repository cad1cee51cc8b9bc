//! Task dispatch: resolve a model, run it, shape its output.
//!
//! Every dispatcher is blocking; the HTTP layer moves calls onto the
//! blocking pool.

pub mod beam;
pub mod format;
pub mod models;
pub mod normalize;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod registry;

use tracing::{debug, instrument};

use crate::error::Result;

use self::{
    format::{BinaryResults, ZeroShotResults},
    models::{EntitySpan, QaAnswer, QaInput},
    registry::{ModelRegistry, Task},
};

/// Outcome of a dispatch: real output, or the task's model is absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<T> {
    Completed(T),
    NotLoaded,
}

fn not_loaded<T>(task: &Task) -> Result<Dispatch<T>> {
    debug!(%task, "model not loaded");
    Ok(Dispatch::NotLoaded)
}

#[instrument(skip_all, fields(documents = documents.len()))]
pub fn entity_recognition(
    registry: &ModelRegistry,
    documents: &[String],
) -> Result<Dispatch<Vec<Vec<EntitySpan>>>> {
    let Some(model) = registry.ner() else {
        return not_loaded(&Task::Ner);
    };
    let spans = model.classify(documents)?;
    Ok(Dispatch::Completed(format::format_entities(spans)))
}

/// Extractive QA; the model's answer is returned unmodified.
#[instrument(skip_all)]
pub fn question_answering(registry: &ModelRegistry, input: &QaInput) -> Result<Dispatch<QaAnswer>> {
    let Some(model) = registry.question_answering() else {
        return not_loaded(&Task::QuestionAnswering);
    };
    Ok(Dispatch::Completed(model.answer(input)?))
}

#[instrument(skip_all, fields(documents = documents.len(), topics = topics.len()))]
pub fn zero_shot(
    registry: &ModelRegistry,
    documents: &[String],
    topics: &[String],
    format_results: bool,
) -> Result<Dispatch<ZeroShotResults>> {
    let Some(model) = registry.zero_shot() else {
        return not_loaded(&Task::ZeroShot);
    };
    let results = model.classify(documents, topics)?;
    Ok(Dispatch::Completed(format::format_zero_shot(
        results,
        format_results,
    )))
}

/// Zero-shot against a single topic, reduced to one value per document.
#[instrument(skip_all, fields(documents = documents.len(), topic = %topic))]
pub fn binary_zero_shot(
    registry: &ModelRegistry,
    documents: &[String],
    topic: &str,
    raw_scores: bool,
    threshold: f64,
) -> Result<Dispatch<BinaryResults>> {
    let Some(model) = registry.zero_shot() else {
        return not_loaded(&Task::ZeroShot);
    };
    let results = model.classify(documents, &[topic.to_string()])?;
    Ok(Dispatch::Completed(format::format_binary_zero_shot(
        &results, raw_scores, threshold,
    )))
}

/// Normalize, split into lines, translate each line, rejoin.
#[instrument(skip(registry, text), fields(chars = text.len()))]
pub fn translate(
    registry: &ModelRegistry,
    variant: &str,
    text: &str,
    num_beams: usize,
) -> Result<Dispatch<String>> {
    let Some(handle) = registry.translation(variant) else {
        return not_loaded(&Task::Translation(variant.to_string()));
    };
    let units = format::split_translation_units(&normalize::normalize(text));
    if units.is_empty() {
        return Ok(Dispatch::Completed(String::new()));
    }
    debug!(units = units.len(), kind = handle.kind(), "translating");
    let translated = handle.translate_lines(&units, num_beams)?;
    Ok(Dispatch::Completed(format::format_translation(&translated)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_reports_not_loaded() {
        let registry = ModelRegistry::default();
        let docs = vec!["Alice".to_string()];
        assert_eq!(entity_recognition(&registry, &docs).unwrap(), Dispatch::NotLoaded);
        assert_eq!(
            translate(&registry, "en-fr", "Hello", 4).unwrap(),
            Dispatch::NotLoaded
        );
        assert_eq!(
            binary_zero_shot(&registry, &docs, "people", false, 0.5).unwrap(),
            Dispatch::NotLoaded
        );
    }
}
