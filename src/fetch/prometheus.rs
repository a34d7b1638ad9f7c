use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::debug;

use super::{Sample, SampleFetcher};

const QUERY_PATH: &str = "/api/v1/query";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSeries>),
    Scalar(SamplePoint),
    Matrix(Vec<IgnoredAny>),
    #[serde(rename = "string")]
    Text(SamplePoint),
}

#[derive(Debug, Deserialize)]
struct VectorSeries {
    value: SamplePoint,
}

/// `[unix_time, "value"]` as returned by the HTTP API.
#[derive(Debug, Deserialize)]
struct SamplePoint(f64, String);

/// Instant-query client against a Prometheus-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusFetcher {
    client: Client,
    query_url: String,
}

impl PrometheusFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Prometheus HTTP client")?;

        Ok(Self {
            client,
            query_url: format!("{}{QUERY_PATH}", base_url.trim_end_matches('/')),
        })
    }
}

impl SampleFetcher for PrometheusFetcher {
    fn fetch(&self, query: &str) -> Result<Sample> {
        let response = self
            .client
            .get(&self.query_url)
            .query(&[("query", query)])
            .send()
            .with_context(|| format!("failed to reach Prometheus at {}", self.query_url))?;

        let status = response.status();
        let body = response
            .bytes()
            .with_context(|| format!("failed to read Prometheus response for query: {query}"))?;

        if !status.is_success() {
            bail!(
                "Prometheus returned HTTP {status} for query {query}: {}",
                String::from_utf8_lossy(&body).trim()
            );
        }

        parse_query_response(&body).with_context(|| format!("invalid response for query: {query}"))
    }
}

/// Reduces an instant-query response body to the first sample.
///
/// An empty result or an unparseable value is a missing sample; a non-success
/// status is an error.
pub(super) fn parse_query_response(body: &[u8]) -> Result<Sample> {
    let response: QueryResponse =
        serde_json::from_slice(body).context("failed to parse Prometheus response json")?;

    if response.status != "success" {
        bail!(
            "Prometheus query failed: status={} error_type={} error={}",
            response.status,
            response.error_type.unwrap_or_default(),
            response.error.unwrap_or_default()
        );
    }

    let point = match response.data {
        None => return Ok(Sample::missing()),
        Some(QueryData::Vector(series)) => match series.into_iter().next() {
            Some(first) => first.value,
            None => return Ok(Sample::missing()),
        },
        Some(QueryData::Scalar(point)) => point,
        Some(QueryData::Matrix(series)) => bail!(
            "range vector result with {} series is not supported; use an instant vector query",
            series.len()
        ),
        Some(QueryData::Text(point)) => {
            bail!("string result {:?} is not a numeric sample", point.1)
        }
    };

    debug!(sample_time = point.0, raw = %point.1, "received sample");
    Ok(parse_sample_value(&point.1))
}

pub(super) fn parse_sample_value(raw: &str) -> Sample {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Sample::present(value),
        Ok(value) => {
            debug!(value = %value, "non-finite sample treated as missing");
            Sample::missing()
        }
        Err(_) => {
            debug!(raw = %raw, "unparseable sample treated as missing");
            Sample::missing()
        }
    }
}

/// Restricts `query` to one target by adding a `label="target"` matcher.
///
/// With an existing matcher the label goes before its last closing brace;
/// otherwise a new matcher is appended.
pub fn with_target_label(query: &str, label: &str, target: &str) -> String {
    if query.contains('{') {
        if let Some((head, tail)) = query.rsplit_once('}') {
            let separator = if head.trim_end().ends_with('{') { "" } else { "," };
            return format!("{head}{separator}{label}=\"{target}\"}}{tail}");
        }
    }

    format!("{query}{{{label}=\"{target}\"}}")
}
