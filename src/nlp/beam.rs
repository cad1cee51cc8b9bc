//! Beam search decoding shared by the translation backends.

use std::cmp::Ordering;

use crate::error::Result;

/// Widest beam the decoder will keep; larger requests are clamped.
pub const MAX_NUM_BEAMS: usize = 256;

/// Produces next-token log-probabilities for a batch of decoder prefixes.
pub trait StepScorer {
    /// One row per prefix, each row covering the whole vocabulary.
    fn next_log_probs(&self, prefixes: &[Vec<i64>]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamConfig {
    pub num_beams: usize,
    pub decoder_start_token_id: i64,
    pub eos_token_id: i64,
    pub max_length: usize,
    pub length_penalty: f32,
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens: Vec<i64>,
    log_prob: f32,
}

impl Hypothesis {
    /// Generated length excludes the start token.
    fn normalised(&self, length_penalty: f32) -> f32 {
        let len = (self.tokens.len().saturating_sub(1)).max(1) as f32;
        self.log_prob / len.powf(length_penalty)
    }
}

/// Decode the best token sequence, without start and end tokens.
pub fn beam_search(scorer: &dyn StepScorer, config: &BeamConfig) -> Result<Vec<i64>> {
    let width = config.num_beams.clamp(1, MAX_NUM_BEAMS);
    let mut live = vec![Hypothesis {
        tokens: vec![config.decoder_start_token_id],
        log_prob: 0.0,
    }];
    let mut finished: Vec<Hypothesis> = Vec::new();
    let mut stopped_early = false;

    for _ in 0..config.max_length {
        let prefixes: Vec<Vec<i64>> = live.iter().map(|h| h.tokens.clone()).collect();
        let rows = scorer.next_log_probs(&prefixes)?;

        let mut candidates: Vec<(usize, i64, f32)> = Vec::new();
        for (beam, row) in rows.iter().enumerate() {
            for (token, lp) in top_k(row, width) {
                candidates.push((beam, token, live[beam].log_prob + lp));
            }
        }
        candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        let mut next = Vec::with_capacity(width.min(candidates.len()));
        for (beam, token, log_prob) in candidates {
            let mut tokens = live[beam].tokens.clone();
            tokens.push(token);
            let hypothesis = Hypothesis { tokens, log_prob };
            if token == config.eos_token_id {
                finished.push(hypothesis);
            } else {
                next.push(hypothesis);
            }
            if next.len() == width || finished.len() >= width {
                break;
            }
        }

        if finished.len() >= width || next.is_empty() {
            stopped_early = true;
            break;
        }
        live = next;
    }

    // Hitting the length limit keeps unfinished beams in the running.
    if !stopped_early {
        finished.extend(live);
    }

    let penalty = config.length_penalty;
    let best = finished.iter().max_by(|a, b| {
        a.normalised(penalty)
            .partial_cmp(&b.normalised(penalty))
            .unwrap_or(Ordering::Equal)
    });

    Ok(best
        .map(|h| {
            h.tokens
                .iter()
                .skip(1)
                .copied()
                .filter(|&t| t != config.eos_token_id)
                .collect()
        })
        .unwrap_or_default())
}

fn top_k(row: &[f32], k: usize) -> Vec<(i64, f32)> {
    let mut indexed: Vec<(i64, f32)> = row
        .iter()
        .enumerate()
        .filter(|(_, lp)| lp.is_finite())
        .map(|(i, &lp)| (i as i64, lp))
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    indexed.truncate(k);
    indexed
}

/// Numerically stable log-softmax.
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|v| (v - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|v| v - log_sum).collect()
}
