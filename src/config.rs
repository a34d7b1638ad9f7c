use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::model::{Direction, MetricSpec, ThresholdSet};

pub const DEFAULT_TARGET_LABEL: &str = "container";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 20;
pub const MAX_METRIC_WEIGHT: f64 = 1.0e9;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    prometheus_url: String,
    rootless_container: String,
    rootful_container: String,
    #[serde(default = "default_target_label")]
    target_label: String,
    #[serde(default = "default_query_timeout_secs")]
    query_timeout_secs: u64,
    #[serde(default)]
    fetch_concurrently: bool,
    #[serde(deserialize_with = "deserialize_metrics")]
    metrics: Vec<MetricSpec>,
    thresholds: ThresholdSet,
    output: OutputConfig,
}

#[derive(Debug, Deserialize)]
struct OutputConfig {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct MetricDefinition {
    query: String,
    #[serde(default)]
    weight: f64,
    #[serde(default)]
    direction: Direction,
}

fn default_target_label() -> String {
    DEFAULT_TARGET_LABEL.to_string()
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

/// Keeps metrics in file order; the order only affects reporting.
fn deserialize_metrics<'de, D>(deserializer: D) -> Result<Vec<MetricSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    struct MetricsVisitor;

    impl<'de> Visitor<'de> for MetricsVisitor {
        type Value = Vec<MetricSpec>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map of metric name to {query, weight, direction}")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut specs = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, definition)) = access.next_entry::<String, MetricDefinition>()? {
                specs.push(MetricSpec {
                    name,
                    query_template: definition.query,
                    weight: definition.weight,
                    direction: definition.direction,
                });
            }
            Ok(specs)
        }
    }

    deserializer.deserialize_map(MetricsVisitor)
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub prometheus_url: String,
    pub rootless_target: String,
    pub rootful_target: String,
    pub target_label: String,
    pub query_timeout: Duration,
    pub fetch_concurrently: bool,
    pub metrics: Vec<MetricSpec>,
    pub thresholds: ThresholdSet,
    pub output_path: PathBuf,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub prometheus_url: Option<String>,
    pub rootless_target: Option<String>,
    pub rootful_target: Option<String>,
    pub output_path: Option<PathBuf>,
    pub fetch_concurrently: bool,
}

impl EvaluatorConfig {
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.prometheus_url {
            self.prometheus_url = url;
        }
        if let Some(target) = overrides.rootless_target {
            self.rootless_target = target;
        }
        if let Some(target) = overrides.rootful_target {
            self.rootful_target = target;
        }
        if let Some(path) = overrides.output_path {
            self.output_path = path;
        }
        if overrides.fetch_concurrently {
            self.fetch_concurrently = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prometheus_url.trim().is_empty() {
            bail!("prometheus_url must not be empty");
        }
        if self.rootless_target.trim().is_empty() || self.rootful_target.trim().is_empty() {
            bail!("rootless and rootful targets must both be set");
        }
        if self.rootless_target == self.rootful_target {
            warn!(
                target_name = %self.rootless_target,
                "rootless and rootful targets are identical; every metric will score neutral"
            );
        }
        if self.target_label.trim().is_empty() {
            bail!("target_label must not be empty");
        }
        if self.query_timeout.is_zero() {
            bail!("query_timeout_secs must be greater than zero");
        }
        if self.metrics.is_empty() {
            bail!("config defines no metrics");
        }

        let mut seen = HashSet::new();
        for spec in &self.metrics {
            if !seen.insert(spec.name.as_str()) {
                bail!("metric {} is defined more than once", spec.name);
            }
            if spec.query_template.trim().is_empty() {
                bail!("metric {} has an empty query", spec.name);
            }
            if !(0.0..=MAX_METRIC_WEIGHT).contains(&spec.weight) {
                bail!(
                    "metric {} has invalid weight {}; weights must be between 0 and {MAX_METRIC_WEIGHT}",
                    spec.name,
                    spec.weight
                );
            }
        }
        if self.metrics.iter().all(|spec| spec.weight == 0.0) {
            warn!("all metric weights are zero; every repetition will score neutral");
        }

        let thresholds = &self.thresholds;
        let cut_points = [
            thresholds.strong_rootless,
            thresholds.mild_rootless,
            thresholds.mild_rootful,
            thresholds.strong_rootful,
        ];
        if cut_points.iter().any(|value| !value.is_finite()) {
            bail!("thresholds must be finite numbers");
        }
        if !thresholds.is_ordered() {
            warn!(
                strong_rootless = thresholds.strong_rootless,
                mild_rootless = thresholds.mild_rootless,
                mild_rootful = thresholds.mild_rootful,
                strong_rootful = thresholds.strong_rootful,
                "thresholds are not descending; verdicts follow priority order"
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<EvaluatorConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<EvaluatorConfig> {
    let file: ConfigFile = serde_json::from_str(raw).context("invalid evaluator config json")?;

    Ok(EvaluatorConfig {
        prometheus_url: file.prometheus_url,
        rootless_target: file.rootless_container,
        rootful_target: file.rootful_container,
        target_label: file.target_label,
        query_timeout: Duration::from_secs(file.query_timeout_secs),
        fetch_concurrently: file.fetch_concurrently,
        metrics: file.metrics,
        thresholds: file.thresholds,
        output_path: file.output.path,
    })
}
