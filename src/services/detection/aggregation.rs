// Aggregation Logic
// Combines per-chunk AI probabilities into the document verdict

use crate::models::{DocumentResult, Label};
use super::error::{DetectionError, DetectionResult};

/// Mean at or above this is labelled AI.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Arithmetic mean of chunk probabilities, summed in chunk order.
pub fn mean_probability(probabilities: &[f64]) -> Option<f64> {
    if probabilities.is_empty() {
        return None;
    }
    Some(probabilities.iter().sum::<f64>() / probabilities.len() as f64)
}

/// Aggregate chunk probabilities into a document result.
///
/// The label follows the mean (ties go to AI) and confidence is the probability of
/// the predicted class, so it is never below 0.5. An empty input means nothing was
/// chunked and is reported as too short; `min_chunk_size` is only used for the message.
pub fn aggregate_chunk_probabilities(
    probabilities: &[f64],
    min_chunk_size: usize,
) -> DetectionResult<DocumentResult> {
    let mean = mean_probability(probabilities)
        .ok_or(DetectionError::InputTooShort { min_chunk_size })?;

    let label = if mean >= DECISION_THRESHOLD {
        Label::Ai
    } else {
        Label::Human
    };
    let confidence = match label {
        Label::Ai => mean,
        Label::Human => 1.0 - mean,
    };

    Ok(DocumentResult {
        label,
        confidence,
        chunks_analyzed: probabilities.len(),
    })
}

/// Verdict for a single unchunked pass: the more probable class wins and an
/// exact tie goes to Human, the class at index 0.
pub fn single_pass_result(ai_probability: f64) -> DocumentResult {
    let (label, confidence) = if ai_probability > 1.0 - ai_probability {
        (Label::Ai, ai_probability)
    } else {
        (Label::Human, 1.0 - ai_probability)
    };
    DocumentResult {
        label,
        confidence,
        chunks_analyzed: 1,
    }
}
