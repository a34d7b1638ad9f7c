use crate::model::{Direction, NEUTRAL_SCORE};

pub(super) const MIN_SCORE: f64 = 0.0;
pub(super) const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedScore {
    /// Symmetric relative delta in `[-1, 1]`; positive means rootless is better.
    pub normalized_delta: f64,
    /// `score * weight`; division by the total weight happens in aggregation.
    pub weighted_contribution: f64,
}

pub fn normalize(rootless: f64, rootful: f64, weight: f64, direction: Direction) -> NormalizedScore {
    // Rescaling by the larger magnitude keeps the difference and sum finite.
    let scale = rootless.abs().max(rootful.abs());
    let relative = if scale == 0.0 {
        0.0
    } else {
        let (rootless, rootful) = (rootless / scale, rootful / scale);
        let denominator = rootless.abs() + rootful.abs();
        ((rootless - rootful) / (denominator / 2.0)).clamp(-1.0, 1.0)
    };

    let normalized_delta = match direction {
        Direction::Higher => relative,
        Direction::Lower => -relative,
    };

    NormalizedScore {
        normalized_delta,
        weighted_contribution: score_from_delta(normalized_delta) * weight,
    }
}

/// Maps a delta onto the 0..100 scale with 50 as the neutral point.
pub fn score_from_delta(normalized_delta: f64) -> f64 {
    (NEUTRAL_SCORE + normalized_delta * 50.0).clamp(MIN_SCORE, MAX_SCORE)
}
