use std::fmt;

use serde::{Deserialize, Serialize};

pub const NEUTRAL_SCORE: f64 = 50.0;
pub const MISSING_SERIES_REASON: &str = "missing series";

/// Which way a raw metric value is better.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Higher,
    Lower,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    pub query_template: String,
    pub weight: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub strong_rootless: f64,
    pub mild_rootless: f64,
    pub mild_rootful: f64,
    pub strong_rootful: f64,
}

impl ThresholdSet {
    /// True when the four cut points descend from strong-rootless to strong-rootful.
    pub fn is_ordered(&self) -> bool {
        self.strong_rootless >= self.mild_rootless
            && self.mild_rootless > self.mild_rootful
            && self.mild_rootful >= self.strong_rootful
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "strong prefer rootless")]
    StrongPreferRootless,
    #[serde(rename = "mild prefer rootless")]
    MildPreferRootless,
    #[serde(rename = "inconclusive")]
    Inconclusive,
    #[serde(rename = "mild prefer rootful")]
    MildPreferRootful,
    #[serde(rename = "strong prefer rootful")]
    StrongPreferRootful,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongPreferRootless => "strong prefer rootless",
            Self::MildPreferRootless => "mild prefer rootless",
            Self::Inconclusive => "inconclusive",
            Self::MildPreferRootful => "mild prefer rootful",
            Self::StrongPreferRootful => "strong prefer rootful",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored or excluded outcome of one metric in one repetition.
///
/// `name` is carried as the key of the enclosing `metrics` map in the report,
/// so it is skipped in the per-metric object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    #[serde(skip)]
    pub name: String,
    pub rootless_value: Option<f64>,
    pub rootful_value: Option<f64>,
    pub direction: Direction,
    pub weight: f64,
    pub included: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_delta: Option<f64>,
    #[serde(
        rename = "weighted_score_contrib",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub weighted_contribution: Option<f64>,
    #[serde(rename = "reason", default, skip_serializing_if = "Option::is_none")]
    pub exclusion_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepetitionResult {
    #[serde(rename = "rep")]
    pub sequence_number: u32,
    pub timestamp: i64,
    #[serde(with = "ordered_metrics")]
    pub metrics: Vec<MetricResult>,
    pub weighted_score: f64,
    pub verdict: Verdict,
    pub effective_weight: f64,
}

impl RepetitionResult {
    pub fn excluded_count(&self) -> usize {
        self.metrics.iter().filter(|metric| !metric.included).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilitySummary {
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub repetitions: usize,
    pub final_verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub rootless_target: String,
    pub rootful_target: String,
    pub repetitions: usize,
    pub mean_weighted_score: f64,
    pub stddev_weighted_score: f64,
    pub min_weighted_score: f64,
    pub max_weighted_score: f64,
    pub thresholds: ThresholdSet,
    pub final_verdict: Verdict,
}

impl ReportSummary {
    pub fn new(
        stability: &StabilitySummary,
        rootless_target: &str,
        rootful_target: &str,
        thresholds: ThresholdSet,
    ) -> Self {
        Self {
            rootless_target: rootless_target.to_string(),
            rootful_target: rootful_target.to_string(),
            repetitions: stability.repetitions,
            mean_weighted_score: stability.mean,
            stddev_weighted_score: stability.stddev,
            min_weighted_score: stability.min,
            max_weighted_score: stability.max,
            thresholds,
            final_verdict: stability.final_verdict,
        }
    }

    pub fn stability(&self) -> StabilitySummary {
        StabilitySummary {
            mean: self.mean_weighted_score,
            stddev: self.stddev_weighted_score,
            min: self.min_weighted_score,
            max: self.max_weighted_score,
            repetitions: self.repetitions,
            final_verdict: self.final_verdict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub compared_at: i64,
    pub summary: ReportSummary,
    pub runs: Vec<RepetitionResult>,
}

/// Serializes `Vec<MetricResult>` as a JSON object keyed by metric name,
/// keeping the vector order on both sides.
mod ordered_metrics {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::MetricResult;

    pub fn serialize<S>(metrics: &[MetricResult], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(metrics.len()))?;
        for metric in metrics {
            map.serialize_entry(&metric.name, metric)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<MetricResult>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MetricsVisitor;

        impl<'de> Visitor<'de> for MetricsVisitor {
            type Value = Vec<MetricResult>;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of metric name to metric result")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut metrics = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, mut metric)) = access.next_entry::<String, MetricResult>()? {
                    metric.name = name;
                    metrics.push(metric);
                }
                Ok(metrics)
            }
        }

        deserializer.deserialize_map(MetricsVisitor)
    }
}
