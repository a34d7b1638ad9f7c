use anyhow::Result;
use tracing::{info, warn};

use crate::cli::SummarizeArgs;
use crate::model::{ComparisonReport, StabilitySummary};
use crate::scoring::summarize;
use crate::util::read_json;

const SCORE_TOLERANCE: f64 = 1e-9;

pub fn run(args: SummarizeArgs) -> Result<()> {
    let report: ComparisonReport = read_json(&args.report)?;
    let summary = &report.summary;

    info!(
        path = %args.report.display(),
        compared_at = report.compared_at,
        rootless = %summary.rootless_target,
        rootful = %summary.rootful_target,
        repetitions = summary.repetitions,
        mean = %format!("{:.2}", summary.mean_weighted_score),
        stddev = %format!("{:.2}", summary.stddev_weighted_score),
        min = %format!("{:.2}", summary.min_weighted_score),
        max = %format!("{:.2}", summary.max_weighted_score),
        final_verdict = %summary.final_verdict,
        "loaded comparison report"
    );

    for run in &report.runs {
        info!(
            rep = run.sequence_number,
            timestamp = run.timestamp,
            weighted_score = %format!("{:.2}", run.weighted_score),
            effective_weight = run.effective_weight,
            excluded = run.excluded_count(),
            verdict = %run.verdict,
            "run"
        );
    }

    if args.recompute {
        let recomputed = summarize(&report.runs);
        let drift = summary_drift(&summary.stability(), &recomputed);
        if drift.is_empty() {
            info!("stored summary matches recomputed runs");
        } else {
            for field in &drift {
                warn!(field = %field, "stored summary differs from recomputed runs");
            }
        }
    }

    Ok(())
}

/// Names the summary fields whose stored value disagrees with a recomputation.
pub fn summary_drift(stored: &StabilitySummary, recomputed: &StabilitySummary) -> Vec<String> {
    let mut drift = Vec::new();
    let scores = [
        ("mean_weighted_score", stored.mean, recomputed.mean),
        ("stddev_weighted_score", stored.stddev, recomputed.stddev),
        ("min_weighted_score", stored.min, recomputed.min),
        ("max_weighted_score", stored.max, recomputed.max),
    ];
    for (name, stored_value, recomputed_value) in scores {
        if (stored_value - recomputed_value).abs() > SCORE_TOLERANCE {
            drift.push(format!("{name}: stored={stored_value} recomputed={recomputed_value}"));
        }
    }
    if stored.repetitions != recomputed.repetitions {
        drift.push(format!(
            "repetitions: stored={} recomputed={}",
            stored.repetitions, recomputed.repetitions
        ));
    }
    if stored.final_verdict != recomputed.final_verdict {
        drift.push(format!(
            "final_verdict: stored={} recomputed={}",
            stored.final_verdict, recomputed.final_verdict
        ));
    }
    drift
}
