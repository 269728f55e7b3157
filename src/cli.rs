use crate::aggregate::BatchOptions;
use crate::identity::LabelRegistry;
use crate::metrics::MetricsOptions;
use crate::utils::{validate_bucket_count, validate_rates, validate_threshold};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SOXIM Metrics - traffic log analysis and saturation detection for NoC simulations
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    /// Verbose output
    #[clap(short = 'v', long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// JSON file extending the known algorithm and traffic pattern labels
    #[clap(long, global = true)]
    pub label_registry: Option<PathBuf>,

    /// Worker threads used to parse logs (0 = one per CPU)
    #[clap(short = 'j', long, global = true, default_value_t = 0)]
    pub jobs: usize,

    /// Buckets in the latency distribution histogram
    #[clap(long, global = true, default_value_t = crate::defaults::HISTOGRAM_BUCKETS)]
    pub histogram_buckets: usize,

    /// Percentiles to calculate for latency metrics
    #[clap(long, global = true, default_values_t = crate::defaults::PERCENTILES.to_vec(), num_args = 1..)]
    pub percentiles: Vec<f64>,
}

/// Analysis to perform
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a single simulation run
    Analyze {
        /// Traffic log, or the run directory containing it
        input: PathBuf,

        /// Write the run's metrics to a JSON file
        #[clap(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Compare several simulation runs side by side
    Compare {
        /// Traffic logs or run directories to compare
        #[clap(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Labels for the runs, in input order (defaults to input file stems)
        #[clap(short = 'l', long, num_args = 1..)]
        labels: Vec<String>,

        /// Write the compared runs to a JSON file
        #[clap(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Find saturation points across an injection-rate sweep
    Saturation {
        /// Results directory searched recursively for traffic logs
        input: PathBuf,

        /// Only analyze runs of this routing algorithm
        #[clap(short = 'a', long)]
        algorithm: Option<String>,

        /// Only analyze runs of this traffic pattern
        #[clap(short = 't', long)]
        traffic_pattern: Option<String>,

        /// Only analyze runs at these injection rates
        #[clap(short = 'r', long, num_args = 1..)]
        injection_rates: Vec<f64>,

        /// Share of peak throughput that marks saturation
        #[clap(long, default_value_t = crate::defaults::SATURATION_THRESHOLD)]
        threshold: f64,

        /// Write the analysis to a JSON file
        #[clap(short = 'o', long)]
        output: Option<PathBuf>,

        /// Write the processed per-run table to a CSV file
        #[clap(long)]
        save_data: Option<PathBuf>,
    },
}

/// Validated settings shared by every subcommand
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub registry: LabelRegistry,
    pub metrics: MetricsOptions,
    pub jobs: usize,
    pub threshold: f64,
}

impl AnalysisConfig {
    /// Validate the parsed arguments and load the label registry
    pub fn from_args(args: &Args) -> Result<Self> {
        validate_bucket_count(args.histogram_buckets)?;
        if let Some(p) = args.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            anyhow::bail!("Percentile {} must be between 0 and 100", p);
        }

        let threshold = match &args.command {
            Command::Saturation {
                threshold,
                injection_rates,
                ..
            } => {
                validate_threshold(*threshold)?;
                validate_rates(injection_rates)?;
                *threshold
            }
            _ => crate::defaults::SATURATION_THRESHOLD,
        };

        let registry = match &args.label_registry {
            Some(path) => LabelRegistry::from_json_file(path)
                .with_context(|| format!("Failed to load label registry {:?}", path))?,
            None => LabelRegistry::default(),
        };

        Ok(Self {
            registry,
            metrics: MetricsOptions {
                percentiles: args.percentiles.clone(),
                histogram_buckets: args.histogram_buckets,
            },
            jobs: args.jobs,
            threshold,
        })
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            metrics: self.metrics.clone(),
            jobs: self.jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_saturation_command() {
        let args = Args::parse_from([
            "soxim-metrics",
            "saturation",
            "results",
            "--algorithm",
            "DOR",
            "-r",
            "0.1",
            "0.2",
            "--threshold",
            "0.9",
        ]);
        let config = AnalysisConfig::from_args(&args).unwrap();
        assert_eq!(config.threshold, 0.9);
        assert_eq!(config.metrics.histogram_buckets, crate::defaults::HISTOGRAM_BUCKETS);

        match args.command {
            Command::Saturation {
                algorithm,
                injection_rates,
                ..
            } => {
                assert_eq!(algorithm.as_deref(), Some("DOR"));
                assert_eq!(injection_rates, vec![0.1, 0.2]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = Args::parse_from(["soxim-metrics", "analyze", "run", "--verbose", "-j", "2"]);
        assert!(args.verbose);
        assert_eq!(args.jobs, 2);
        assert_eq!(args.percentiles, vec![50.0, 95.0, 99.0]);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let args = Args::parse_from(["soxim-metrics", "saturation", "results", "--threshold", "1.5"]);
        assert!(AnalysisConfig::from_args(&args).is_err());
    }

    #[test]
    fn test_invalid_percentile_rejected() {
        let args = Args::parse_from(["soxim-metrics", "analyze", "run", "--percentiles", "101"]);
        assert!(AnalysisConfig::from_args(&args).is_err());
    }

    #[test]
    fn test_missing_label_registry_fails() {
        let args = Args::parse_from([
            "soxim-metrics",
            "analyze",
            "run",
            "--label-registry",
            "/nonexistent/labels.json",
        ]);
        assert!(AnalysisConfig::from_args(&args).is_err());
    }
}
