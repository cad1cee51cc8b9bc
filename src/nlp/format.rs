//! Post-processing of raw model output into response shapes.

use indexmap::IndexMap;
use serde::Serialize;

use crate::nlp::models::{EntitySpan, ZeroShotOutput};

/// Separator placed between translated lines.
pub const TRANSLATION_SEPARATOR: &str = "\n\n";

/// Zero-shot results, either zipped into label/score maps or left raw.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ZeroShotResults {
    Mappings(Vec<IndexMap<String, f64>>),
    Raw(Vec<ZeroShotOutput>),
}

/// Binary zero-shot results: raw probabilities or thresholded decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BinaryResults {
    Scores(Vec<f64>),
    Decisions(Vec<bool>),
}

/// Merge text-adjacent spans sharing an entity group, per document.
///
/// Pairs are visited from the end of the list so that runs of any length
/// collapse into their first span.
pub fn format_entities(documents: Vec<Vec<EntitySpan>>) -> Vec<Vec<EntitySpan>> {
    documents.into_iter().map(merge_spans).collect()
}

fn merge_spans(mut spans: Vec<EntitySpan>) -> Vec<EntitySpan> {
    if spans.len() < 2 {
        return spans;
    }
    let mut absorbed = vec![false; spans.len()];
    for i in (0..spans.len() - 1).rev() {
        let (head, tail) = spans.split_at_mut(i + 1);
        let (earlier, later) = (&mut head[i], &tail[0]);
        if earlier.entity_group == later.entity_group && earlier.end == later.start {
            earlier.end = later.end;
            earlier.word.push_str(&later.word);
            earlier.score = earlier.score.max(later.score);
            absorbed[i + 1] = true;
        }
    }
    spans
        .into_iter()
        .zip(absorbed)
        .filter_map(|(span, gone)| (!gone).then_some(span))
        .collect()
}

/// Zip each document's parallel labels/scores into an ordered mapping.
pub fn format_zero_shot(results: Vec<ZeroShotOutput>, format_results: bool) -> ZeroShotResults {
    if !format_results {
        return ZeroShotResults::Raw(results);
    }
    ZeroShotResults::Mappings(
        results
            .into_iter()
            .map(|result| result.labels.into_iter().zip(result.scores).collect())
            .collect(),
    )
}

/// Reduce each document to the score of its single topic.
///
/// Thresholding is strict: a score equal to `threshold` is `false`.
pub fn format_binary_zero_shot(
    results: &[ZeroShotOutput],
    raw_scores: bool,
    threshold: f64,
) -> BinaryResults {
    let first = results
        .iter()
        .map(|r| r.scores.first().copied().unwrap_or(0.0));
    if raw_scores {
        BinaryResults::Scores(first.collect())
    } else {
        BinaryResults::Decisions(first.map(|score| score > threshold).collect())
    }
}

/// Split a document into trimmed, non-empty lines.
pub fn split_translation_units(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join translated lines with a blank line between consecutive units.
pub fn format_translation<S: AsRef<str>>(units: &[S]) -> String {
    units
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(TRANSLATION_SEPARATOR)
}
