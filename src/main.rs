//! # SOXIM Metrics - Main Entry Point
//!
//! Command-line front end for the analysis library. Three subcommands are
//! offered:
//! - `analyze`: statistics of a single simulation run
//! - `compare`: several runs side by side
//! - `saturation`: saturation points across an injection-rate sweep
//!
//! ## Error Handling
//!
//! Library errors are wrapped with `anyhow` context and reported once at the
//! top level. Batch loading tolerates unreadable runs: they are logged as
//! warnings and listed in the result file, and the analysis continues with
//! the runs that loaded.

use anyhow::{Context, Result};
use clap::Parser;
use soxim_metrics::{
    aggregate::{load_run, load_runs, RunTable},
    cli::{AnalysisConfig, Args, Command},
    event::resolve_log_path,
    identity::IdentityResolver,
    logging,
    report::{
        print_comparison, print_run_report, print_saturation_analysis, save_processed_data,
        LabeledRun, ResultsManager,
    },
    saturation::SaturationDetector,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    debug!("Configuration: {:?}", args);
    let config = AnalysisConfig::from_args(&args)?;
    let resolver = IdentityResolver::new(&config.registry)?;

    match &args.command {
        Command::Analyze { input, output } => {
            analyze(&config, &resolver, input, output.as_deref())
        }
        Command::Compare {
            inputs,
            labels,
            output,
        } => compare(&config, &resolver, inputs, labels, output.as_deref()),
        Command::Saturation {
            input,
            algorithm,
            traffic_pattern,
            injection_rates,
            output,
            save_data,
            ..
        } => {
            let filters = Filters {
                algorithm: algorithm.as_deref(),
                traffic_pattern: traffic_pattern.as_deref(),
                injection_rates,
            };
            saturation(
                &config,
                &resolver,
                input,
                &filters,
                output.as_deref(),
                save_data.as_deref(),
            )
        }
    }
}

fn analyze(
    config: &AnalysisConfig,
    resolver: &IdentityResolver,
    input: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let log_path = resolve_log_path(input)?;
    info!("Loading data from: {:?}", log_path);

    let record = load_run(&log_path, resolver, &config.metrics)
        .with_context(|| format!("Failed to analyze {:?}", log_path))?;
    print_run_report(&record.metrics);

    if let Some(output) = output {
        let mut manager = ResultsManager::new(output);
        manager.add_run(record);
        manager.finalize()?;
    }
    Ok(())
}

/// Label a run by the name of the path the user gave for it
fn default_label(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}

fn compare(
    config: &AnalysisConfig,
    resolver: &IdentityResolver,
    inputs: &[PathBuf],
    labels: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let mut runs = Vec::new();

    for (i, input) in inputs.iter().enumerate() {
        let loaded = resolve_log_path(input)
            .and_then(|log_path| load_run(&log_path, resolver, &config.metrics));
        let record = match loaded {
            Ok(record) => record,
            Err(e) if e.is_per_run() => {
                warn!("{}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let label = labels
            .get(i)
            .cloned()
            .unwrap_or_else(|| default_label(input));
        runs.push(LabeledRun { label, record });
    }

    if runs.is_empty() {
        anyhow::bail!("No valid data to compare");
    }

    print_comparison(&runs);

    if let Some(output) = output {
        let mut manager = ResultsManager::new(output);
        for run in runs {
            manager.add_run(run.record);
        }
        manager.finalize()?;
    }
    Ok(())
}

/// Run-table filters requested on the command line
struct Filters<'a> {
    algorithm: Option<&'a str>,
    traffic_pattern: Option<&'a str>,
    injection_rates: &'a [f64],
}

impl Filters<'_> {
    fn apply(&self, mut table: RunTable) -> Result<RunTable> {
        if let Some(algorithm) = self.algorithm {
            table = table.filter_by_algorithm(algorithm)?;
        }
        if let Some(pattern) = self.traffic_pattern {
            table = table.filter_by_pattern(pattern)?;
        }
        if !self.injection_rates.is_empty() {
            table = table.filter_by_rates(self.injection_rates)?;
        }
        Ok(table)
    }
}

fn saturation(
    config: &AnalysisConfig,
    resolver: &IdentityResolver,
    input: &Path,
    filters: &Filters<'_>,
    output: Option<&Path>,
    save_data: Option<&Path>,
) -> Result<()> {
    info!("Loading results from: {:?}", input);
    let batch = load_runs(input, resolver, &config.batch_options())?;
    if !batch.skipped.is_empty() {
        warn!(
            "{} run(s) could not be loaded and were skipped",
            batch.skipped.len()
        );
    }

    let table = filters.apply(batch.table)?;
    let detector = SaturationDetector::with_threshold(config.threshold);
    print_saturation_analysis(&table, &detector);

    if let Some(path) = save_data {
        save_processed_data(&table, path)?;
    }

    if let Some(output) = output {
        let mut manager = ResultsManager::new(output);
        manager.add_table(&table);
        manager.add_skipped(&batch.skipped);
        manager.add_saturation(&table, &detector);
        manager.finalize()?;
    }
    Ok(())
}
