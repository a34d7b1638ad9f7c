use crate::model::{NEUTRAL_SCORE, RepetitionResult, StabilitySummary, Verdict};

pub fn summarize(results: &[RepetitionResult]) -> StabilitySummary {
    let scores = results
        .iter()
        .map(|result| result.weighted_score)
        .collect::<Vec<f64>>();
    let final_verdict = results
        .last()
        .map(|result| result.verdict)
        .unwrap_or(Verdict::Inconclusive);

    summarize_scores(&scores, final_verdict)
}

pub fn summarize_scores(scores: &[f64], final_verdict: Verdict) -> StabilitySummary {
    if scores.is_empty() {
        return StabilitySummary {
            mean: NEUTRAL_SCORE,
            stddev: 0.0,
            min: NEUTRAL_SCORE,
            max: NEUTRAL_SCORE,
            repetitions: 0,
            final_verdict,
        };
    }

    let count = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / count;
    let variance = scores
        .iter()
        .map(|score| (score - mean).powi(2))
        .sum::<f64>()
        / count;

    StabilitySummary {
        mean,
        stddev: variance.sqrt(),
        min: scores.iter().copied().fold(f64::INFINITY, f64::min),
        max: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        repetitions: scores.len(),
        final_verdict,
    }
}
