use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::CompareArgs;
use crate::config::{EvaluatorConfig, load_config};
use crate::fetch::{LabeledSource, PrometheusFetcher, SampleSource};
use crate::model::{ComparisonReport, ReportSummary, RepetitionResult};
use crate::scoring::{RepetitionPlan, aggregate_repetition, summarize};
use crate::util::{now_epoch_seconds, write_json_pretty};

pub fn run(args: CompareArgs) -> Result<()> {
    let interval = rep_interval(args.rep_interval)?;

    let mut config = load_config(&args.config)?;
    config.apply_overrides(args.overrides());
    config.validate()?;

    info!(
        config = %args.config.display(),
        prometheus = %config.prometheus_url,
        rootless = %config.rootless_target,
        rootful = %config.rootful_target,
        metrics = config.metrics.len(),
        repetitions = args.reps,
        rep_interval_secs = args.rep_interval,
        "comparison started"
    );

    let fetcher = PrometheusFetcher::new(&config.prometheus_url, config.query_timeout)?;
    let source = LabeledSource::new(&fetcher, &config.target_label);
    let report = run_comparison(&config, &source, args.reps, interval)?;

    write_json_pretty(&config.output_path, &report)?;
    info!(
        path = %config.output_path.display(),
        mean = %format!("{:.2}", report.summary.mean_weighted_score),
        stddev = %format!("{:.2}", report.summary.stddev_weighted_score),
        final_verdict = %report.summary.final_verdict,
        "report written"
    );

    Ok(())
}

fn rep_interval(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("--rep-interval must be a non-negative number of seconds, got {seconds}");
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Runs every repetition in order and assembles the report.
///
/// A fatal fetch error aborts the whole run; completed repetitions are dropped
/// and no report is produced.
pub fn run_comparison<S>(
    config: &EvaluatorConfig,
    source: &S,
    repetitions: u32,
    interval: Duration,
) -> Result<ComparisonReport>
where
    S: SampleSource + ?Sized,
{
    if repetitions == 0 {
        bail!("at least one repetition is required");
    }

    let plan = RepetitionPlan {
        specs: &config.metrics,
        rootless_target: &config.rootless_target,
        rootful_target: &config.rootful_target,
        thresholds: &config.thresholds,
        fetch_concurrently: config.fetch_concurrently,
    };

    let mut runs = Vec::<RepetitionResult>::with_capacity(repetitions as usize);
    for sequence_number in 1..=repetitions {
        let result = aggregate_repetition(&plan, sequence_number, source).with_context(|| {
            format!(
                "repetition {sequence_number} of {repetitions} failed; discarding {} completed repetition(s)",
                runs.len()
            )
        })?;
        log_repetition(&result, repetitions);
        runs.push(result);

        if sequence_number < repetitions && !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    let stability = summarize(&runs);
    let summary = ReportSummary::new(
        &stability,
        &config.rootless_target,
        &config.rootful_target,
        config.thresholds,
    );

    Ok(ComparisonReport {
        compared_at: now_epoch_seconds(),
        summary,
        runs,
    })
}

fn log_repetition(result: &RepetitionResult, repetitions: u32) {
    let excluded = result.excluded_count();
    if excluded == result.metrics.len() {
        warn!(
            rep = result.sequence_number,
            metrics = excluded,
            "no metric could be scored; repetition defaults to neutral"
        );
    } else if excluded > 0 {
        let names = result
            .metrics
            .iter()
            .filter(|metric| !metric.included)
            .map(|metric| metric.name.as_str())
            .collect::<Vec<&str>>()
            .join(",");
        warn!(rep = result.sequence_number, excluded = %names, "metrics excluded for missing series");
    }

    info!(
        rep = result.sequence_number,
        of = repetitions,
        weighted_score = %format!("{:.2}", result.weighted_score),
        effective_weight = result.effective_weight,
        verdict = %result.verdict,
        "repetition complete"
    );
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{Result, bail};

    use super::run_comparison;
    use crate::config::EvaluatorConfig;
    use crate::fetch::Sample;
    use crate::model::{ComparisonReport, Direction, MetricSpec, ThresholdSet, Verdict};
    use crate::util::{read_json, write_json_pretty};

    fn config() -> EvaluatorConfig {
        EvaluatorConfig {
            prometheus_url: "http://localhost:9090".to_string(),
            rootless_target: "rl".to_string(),
            rootful_target: "rf".to_string(),
            target_label: "container".to_string(),
            query_timeout: Duration::from_secs(20),
            fetch_concurrently: false,
            metrics: vec![
                MetricSpec {
                    name: "cpu".to_string(),
                    query_template: "cpu_seconds".to_string(),
                    weight: 2.0,
                    direction: Direction::Lower,
                },
                MetricSpec {
                    name: "rps".to_string(),
                    query_template: "requests_per_second".to_string(),
                    weight: 1.0,
                    direction: Direction::Higher,
                },
            ],
            thresholds: ThresholdSet {
                strong_rootless: 75.0,
                mild_rootless: 60.0,
                mild_rootful: 40.0,
                strong_rootful: 25.0,
            },
            output_path: PathBuf::from("comparison.json"),
        }
    }

    #[test]
    fn repetitions_are_numbered_and_summarized() {
        let config = config();
        let calls = AtomicUsize::new(0);
        let source = |spec: &MetricSpec, target: &str| -> Result<Sample> {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if spec.name == "rps" && target == "rf" && call >= 4 {
                return Ok(Sample::missing());
            }
            Ok(Sample::present(if target == "rl" { 10.0 } else { 20.0 }))
        };

        let report = run_comparison(&config, &source, 3, Duration::ZERO).expect("run should succeed");

        assert_eq!(report.runs.len(), 3);
        assert_eq!(
            report
                .runs
                .iter()
                .map(|run| run.sequence_number)
                .collect::<Vec<u32>>(),
            vec![1, 2, 3]
        );
        assert_eq!(report.runs[0].effective_weight, 3.0);
        assert_eq!(report.runs[1].effective_weight, 2.0);
        assert_eq!(report.summary.repetitions, 3);
        assert_eq!(report.summary.rootless_target, "rl");
        assert_eq!(report.summary.rootful_target, "rf");
        assert_eq!(report.summary.final_verdict, report.runs[2].verdict);
        assert!(report.summary.min_weighted_score <= report.summary.mean_weighted_score);
        assert!(report.summary.max_weighted_score >= report.summary.mean_weighted_score);
    }

    #[test]
    fn fatal_error_discards_completed_repetitions() {
        let config = config();
        let calls = AtomicUsize::new(0);
        let source = |_: &MetricSpec, _: &str| -> Result<Sample> {
            if calls.fetch_add(1, Ordering::SeqCst) >= 4 {
                bail!("prometheus unavailable");
            }
            Ok(Sample::present(1.0))
        };

        let error = run_comparison(&config, &source, 3, Duration::ZERO)
            .expect_err("backend failure should abort the run");
        let message = format!("{error:#}");
        assert!(message.contains("repetition 2 of 3"), "unexpected error: {message}");
        assert!(message.contains("prometheus unavailable"), "unexpected error: {message}");
    }

    #[test]
    fn zero_repetitions_is_rejected() {
        let config = config();
        let source = |_: &MetricSpec, _: &str| -> Result<Sample> { Ok(Sample::present(1.0)) };
        assert!(run_comparison(&config, &source, 0, Duration::ZERO).is_err());
    }

    #[test]
    fn report_round_trips_with_stable_field_names() {
        let config = config();
        let source = |spec: &MetricSpec, target: &str| -> Result<Sample> {
            if spec.name == "rps" && target == "rf" {
                return Ok(Sample::missing());
            }
            Ok(Sample::present(if target == "rl" { 10.0 } else { 20.0 }))
        };
        let report = run_comparison(&config, &source, 1, Duration::ZERO).expect("run should succeed");

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("comparison.json");
        write_json_pretty(&path, &report).expect("report should be written");

        let raw: serde_json::Value = read_json(&path).expect("report should be valid json");
        let run = &raw["runs"][0];
        assert_eq!(run["rep"], 1);
        assert_eq!(run["verdict"], "strong prefer rootless");
        assert_eq!(run["metrics"]["cpu"]["included"], true);
        assert_eq!(run["metrics"]["cpu"]["direction"], "lower");
        assert!(run["metrics"]["cpu"]["weighted_score_contrib"].is_number());
        assert_eq!(run["metrics"]["rps"]["included"], false);
        assert_eq!(run["metrics"]["rps"]["reason"], "missing series");
        assert!(run["metrics"]["rps"]["rootful_value"].is_null());
        assert!(run["metrics"]["rps"].get("normalized_delta").is_none());
        assert_eq!(raw["summary"]["final_verdict"], "strong prefer rootless");
        assert_eq!(raw["summary"]["thresholds"]["mild_rootful"], 40.0);
        assert!(raw["summary"]["mean_weighted_score"].is_number());
        assert!(raw["compared_at"].is_i64());

        let parsed: ComparisonReport = read_json(&path).expect("report should deserialize");
        assert_eq!(parsed.compared_at, report.compared_at);
        assert_eq!(parsed.runs.len(), 1);
        assert_eq!(
            parsed.runs[0]
                .metrics
                .iter()
                .map(|metric| metric.name.as_str())
                .collect::<Vec<&str>>(),
            vec!["cpu", "rps"]
        );
        assert!((parsed.runs[0].weighted_score - report.runs[0].weighted_score).abs() < 1e-9);
        assert_eq!(parsed.summary.final_verdict, Verdict::StrongPreferRootless);
    }
}
