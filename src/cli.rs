use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "rootcompare",
    version,
    about = "Compare rootless and rootful container performance from Prometheus metrics"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Compare(CompareArgs),
    Summarize(SummarizeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(long, default_value = "evaluator_config.json")]
    pub config: PathBuf,

    /// Override the Prometheus base URL from the config.
    #[arg(long = "prom")]
    pub prometheus_url: Option<String>,

    #[arg(long)]
    pub rootless: Option<String>,

    #[arg(long)]
    pub rootful: Option<String>,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub reps: u32,

    /// Seconds to wait between repetitions.
    #[arg(long, default_value_t = 5.0)]
    pub rep_interval: f64,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub fetch_concurrently: bool,
}

impl CompareArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            prometheus_url: self.prometheus_url.clone(),
            rootless_target: self.rootless.clone(),
            rootful_target: self.rootful.clone(),
            output_path: self.output.clone(),
            fetch_concurrently: self.fetch_concurrently,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SummarizeArgs {
    #[arg(long)]
    pub report: PathBuf,

    /// Recompute the stability summary from the stored runs and flag drift.
    #[arg(long, default_value_t = false)]
    pub recompute: bool,
}
