mod prometheus;

#[cfg(test)]
mod tests;

use anyhow::Result;
use tracing::debug;

use crate::model::MetricSpec;

pub use prometheus::{PrometheusFetcher, with_target_label};

/// One raw observation. `ok == false` means the series had no usable data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: Option<f64>,
    pub ok: bool,
}

impl Sample {
    pub fn present(value: f64) -> Self {
        Self {
            value: Some(value),
            ok: true,
        }
    }

    pub fn missing() -> Self {
        Self {
            value: None,
            ok: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePair {
    pub rootless: Sample,
    pub rootful: Sample,
}

/// Executes a fully labelled query.
///
/// No data must come back as `Ok(Sample::missing())`; an `Err` is fatal for the run.
pub trait SampleFetcher {
    fn fetch(&self, query: &str) -> Result<Sample>;
}

/// Resolves a metric for one target.
pub trait SampleSource: Sync {
    fn sample(&self, spec: &MetricSpec, target: &str) -> Result<Sample>;
}

impl<F> SampleSource for F
where
    F: Fn(&MetricSpec, &str) -> Result<Sample> + Sync,
{
    fn sample(&self, spec: &MetricSpec, target: &str) -> Result<Sample> {
        self(spec, target)
    }
}

/// Adapts a [`SampleFetcher`] by injecting the target as a label matcher.
#[derive(Debug)]
pub struct LabeledSource<'a, F> {
    fetcher: &'a F,
    label: &'a str,
}

impl<'a, F> LabeledSource<'a, F> {
    pub fn new(fetcher: &'a F, label: &'a str) -> Self {
        Self { fetcher, label }
    }
}

impl<F> SampleSource for LabeledSource<'_, F>
where
    F: SampleFetcher + Sync,
{
    fn sample(&self, spec: &MetricSpec, target: &str) -> Result<Sample> {
        let query = with_target_label(&spec.query_template, self.label, target);
        debug!(metric = %spec.name, scrape_target = %target, query = %query, "fetching sample");
        self.fetcher.fetch(&query)
    }
}
