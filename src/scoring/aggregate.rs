use std::thread;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::fetch::{Sample, SamplePair, SampleSource};
use crate::model::{
    MISSING_SERIES_REASON, MetricResult, MetricSpec, NEUTRAL_SCORE, RepetitionResult,
    ThresholdSet, Verdict,
};
use crate::util::now_epoch_seconds;

use super::normalize::{MAX_SCORE, MIN_SCORE, normalize, score_from_delta};

/// Everything one repetition needs besides the sample source.
#[derive(Debug, Clone, Copy)]
pub struct RepetitionPlan<'a> {
    pub specs: &'a [MetricSpec],
    pub rootless_target: &'a str,
    pub rootful_target: &'a str,
    pub thresholds: &'a ThresholdSet,
    pub fetch_concurrently: bool,
}

pub fn aggregate_repetition<S>(
    plan: &RepetitionPlan<'_>,
    sequence_number: u32,
    source: &S,
) -> Result<RepetitionResult>
where
    S: SampleSource + ?Sized,
{
    let mut metrics = Vec::with_capacity(plan.specs.len());
    for spec in plan.specs {
        let pair = fetch_pair(plan, spec, source)?;
        let result = score_metric(spec, &pair);
        debug!(
            rep = sequence_number,
            metric = %result.name,
            included = result.included,
            rootless = ?result.rootless_value,
            rootful = ?result.rootful_value,
            normalized_delta = ?result.normalized_delta,
            "scored metric"
        );
        metrics.push(result);
    }

    Ok(combine_metrics(
        sequence_number,
        now_epoch_seconds(),
        metrics,
        plan.thresholds,
    ))
}

fn fetch_pair<S>(plan: &RepetitionPlan<'_>, spec: &MetricSpec, source: &S) -> Result<SamplePair>
where
    S: SampleSource + ?Sized,
{
    if !plan.fetch_concurrently {
        return Ok(SamplePair {
            rootless: source.sample(spec, plan.rootless_target)?,
            rootful: source.sample(spec, plan.rootful_target)?,
        });
    }

    let (rootless, rootful) = thread::scope(|scope| {
        let rootless = scope.spawn(|| source.sample(spec, plan.rootless_target));
        let rootful = source.sample(spec, plan.rootful_target);
        let rootless = rootless
            .join()
            .unwrap_or_else(|_| Err(anyhow!("rootless fetch panicked for metric {}", spec.name)));
        (rootless, rootful)
    });

    Ok(SamplePair {
        rootless: rootless?,
        rootful: rootful?,
    })
}

/// Scores one metric, or records it as excluded when either side has no usable sample.
pub fn score_metric(spec: &MetricSpec, pair: &SamplePair) -> MetricResult {
    let mut result = MetricResult {
        name: spec.name.clone(),
        rootless_value: pair.rootless.value,
        rootful_value: pair.rootful.value,
        direction: spec.direction,
        weight: spec.weight,
        included: false,
        normalized_delta: None,
        weighted_contribution: None,
        exclusion_reason: None,
    };

    match (usable(&pair.rootless), usable(&pair.rootful)) {
        (Some(rootless), Some(rootful)) => {
            let score = normalize(rootless, rootful, spec.weight, spec.direction);
            result.included = true;
            result.normalized_delta = Some(score.normalized_delta);
            result.weighted_contribution = Some(score.weighted_contribution);
        }
        _ => {
            result.exclusion_reason = Some(MISSING_SERIES_REASON.to_string());
        }
    }

    result
}

fn usable(sample: &Sample) -> Option<f64> {
    if sample.ok { sample.value } else { None }
}

/// Folds scored metrics into the repetition's weighted score and verdict.
///
/// Excluded metrics add nothing to either the sum or the denominator.
pub fn combine_metrics(
    sequence_number: u32,
    timestamp: i64,
    metrics: Vec<MetricResult>,
    thresholds: &ThresholdSet,
) -> RepetitionResult {
    let total_weight: f64 = metrics
        .iter()
        .filter(|metric| metric.included)
        .map(|metric| metric.weight)
        .sum();

    // Averaging over weight shares equals sum(contribution) / total_weight
    // without forming products that can overflow.
    let weighted_score = if total_weight > 0.0 {
        metrics
            .iter()
            .filter(|metric| metric.included)
            .map(|metric| {
                score_from_delta(metric.normalized_delta.unwrap_or(0.0))
                    * (metric.weight / total_weight)
            })
            .sum::<f64>()
            .clamp(MIN_SCORE, MAX_SCORE)
    } else {
        NEUTRAL_SCORE
    };

    RepetitionResult {
        sequence_number,
        timestamp,
        metrics,
        weighted_score,
        verdict: classify_verdict(weighted_score, thresholds),
        effective_weight: total_weight,
    }
}

/// First match wins; the threshold set is not checked for internal ordering.
pub fn classify_verdict(score: f64, thresholds: &ThresholdSet) -> Verdict {
    if score >= thresholds.strong_rootless {
        Verdict::StrongPreferRootless
    } else if score >= thresholds.mild_rootless {
        Verdict::MildPreferRootless
    } else if score <= thresholds.strong_rootful {
        Verdict::StrongPreferRootful
    } else if score <= thresholds.mild_rootful {
        Verdict::MildPreferRootful
    } else {
        Verdict::Inconclusive
    }
}
