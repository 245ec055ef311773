use crate::error::{Error, Result};
use crate::models::RankedLabel;
use std::cmp::Ordering;

/// Pairs every vocabulary entry with its probability and orders the result
/// for display: probability descending, ties keeping vocabulary order. The
/// output always covers the full vocabulary, zero-probability labels
/// included.
pub fn rank(vocabulary: &[String], probabilities: &[f32]) -> Result<Vec<RankedLabel>> {
    if vocabulary.len() != probabilities.len() {
        return Err(Error::Inference(format!(
            "Probability vector length {} does not match vocabulary length {}",
            probabilities.len(),
            vocabulary.len()
        )));
    }
    let mut ranked: Vec<RankedLabel> = vocabulary
        .iter()
        .zip(probabilities.iter())
        .map(|(label, prob)| RankedLabel {
            label: label.clone(),
            probability: *prob,
        })
        .collect();
    // sort_by is stable, so equal probabilities preserve vocabulary order.
    ranked.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
    });
    Ok(ranked)
}
