//! # Run Aggregation
//!
//! Collects the metrics of many simulation runs into a [`RunTable`] labeled
//! with each run's identity. Batch loading discovers every traffic log under
//! a results directory, parses and summarizes the runs in parallel, and
//! skips runs whose logs cannot be read without failing the batch.

use crate::error::AnalysisError;
use crate::event::{load_log, PacketEvent};
use crate::identity::{IdentityResolver, RunIdentity};
use crate::metrics::{compute_metrics_with, MetricsOptions, RunMetrics};
use crate::utils::get_cpu_cores;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Canonical key for joining runs on injection rate.
///
/// Rates are scaled by 10⁹ and rounded, so `0.1` parsed from a directory
/// name and `0.1` typed on the command line compare equal even if their
/// binary representations were produced differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RateKey(i64);

impl RateKey {
    const SCALE: f64 = 1e9;

    pub fn new(rate: f64) -> Self {
        Self((rate * Self::SCALE).round() as i64)
    }
}

impl From<f64> for RateKey {
    fn from(rate: f64) -> Self {
        Self::new(rate)
    }
}

/// One analyzed run: where it came from, what it was, what it measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub log_path: PathBuf,
    pub identity: RunIdentity,
    pub metrics: RunMetrics,
}

impl RunRecord {
    pub fn rate_key(&self) -> RateKey {
        RateKey::new(self.identity.injection_rate)
    }

    pub fn throughput(&self) -> f64 {
        self.metrics.throughput()
    }
}

/// Pair a run's identity with the metrics of its events
pub fn aggregate(
    log_path: &Path,
    events: &[PacketEvent],
    identity: RunIdentity,
    options: &MetricsOptions,
) -> RunRecord {
    RunRecord {
        log_path: log_path.to_path_buf(),
        identity,
        metrics: compute_metrics_with(events, options),
    }
}

/// Ordered collection of run records; duplicates are retained
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTable {
    records: Vec<RunRecord>,
}

impl RunTable {
    pub fn collect<I: IntoIterator<Item = RunRecord>>(records: I) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RunRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RunRecord> {
        self.records.iter()
    }

    /// Distinct algorithm labels in first-appearance order
    pub fn algorithms(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for record in &self.records {
            let algorithm = record.identity.algorithm.as_str();
            if !seen.contains(&algorithm) {
                seen.push(algorithm);
            }
        }
        seen
    }

    fn retain_where<F: Fn(&RunRecord) -> bool>(&self, keep: F) -> Self {
        Self {
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Rows for one algorithm; may be empty
    pub fn retain_algorithm(&self, algorithm: &str) -> Self {
        self.retain_where(|r| r.identity.algorithm == algorithm)
    }

    /// Rows for one traffic pattern; may be empty
    pub fn retain_pattern(&self, pattern: &str) -> Self {
        self.retain_where(|r| r.identity.traffic_pattern == pattern)
    }

    /// Rows whose rate matches one of `rates`; may be empty
    pub fn retain_rates(&self, rates: &[f64]) -> Self {
        let keys: Vec<RateKey> = rates.iter().map(|&r| RateKey::new(r)).collect();
        self.retain_where(|r| keys.contains(&r.rate_key()))
    }

    /// Rows for one algorithm; fails when none remain
    pub fn filter_by_algorithm(&self, algorithm: &str) -> Result<Self, AnalysisError> {
        non_empty(
            self.retain_algorithm(algorithm),
            || format!("algorithm: {}", algorithm),
        )
    }

    /// Rows for one traffic pattern; fails when none remain
    pub fn filter_by_pattern(&self, pattern: &str) -> Result<Self, AnalysisError> {
        non_empty(self.retain_pattern(pattern), || format!("pattern: {}", pattern))
    }

    /// Rows at the given injection rates; fails when none remain
    pub fn filter_by_rates(&self, rates: &[f64]) -> Result<Self, AnalysisError> {
        non_empty(self.retain_rates(rates), || {
            "specified injection rates".to_string()
        })
    }
}

impl<'a> IntoIterator for &'a RunTable {
    type Item = &'a RunRecord;
    type IntoIter = std::slice::Iter<'a, RunRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn non_empty<F: FnOnce() -> String>(table: RunTable, context: F) -> Result<RunTable, AnalysisError> {
    if table.is_empty() {
        Err(AnalysisError::empty(context()))
    } else {
        Ok(table)
    }
}

/// A run left out of a batch and the reason it was skipped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRun {
    pub log_path: PathBuf,
    pub reason: String,
}

/// Result of loading a results directory
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub table: RunTable,
    pub skipped: Vec<SkippedRun>,
}

/// Settings for batch loading
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub metrics: MetricsOptions,
    /// Worker threads used for parsing; 0 means one per CPU
    pub jobs: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            metrics: MetricsOptions::default(),
            jobs: 0,
        }
    }
}

/// Find every traffic log below `root`, sorted by path
pub fn discover_logs(root: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    if !root.exists() {
        return Err(AnalysisError::FileNotFound {
            path: root.to_path_buf(),
        });
    }

    let pattern = format!(
        "{}/**/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        crate::defaults::TRAFFIC_LOG_FILE
    );
    let entries = glob::glob(&pattern).map_err(|e| AnalysisError::Io {
        path: root.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
    })?;

    let mut logs = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => logs.push(path),
            Err(e) => warn!("Could not inspect {:?}: {}", e.path(), e.error()),
        }
    }
    logs.sort();
    Ok(logs)
}

/// Load, identify and summarize a single run
pub fn load_run(
    log_path: &Path,
    resolver: &IdentityResolver,
    options: &MetricsOptions,
) -> Result<RunRecord, AnalysisError> {
    let events = load_log(log_path)?;
    let identity = resolver.identify_run(log_path);
    debug!(
        "Identified {:?} as {} / {} @ {}",
        log_path, identity.algorithm, identity.traffic_pattern, identity.injection_rate
    );
    Ok(aggregate(log_path, &events, identity, options))
}

/// Load every run found below `root`.
///
/// Runs are processed in parallel; the table is assembled in path order so
/// the result does not depend on completion order. Unreadable runs are
/// logged and skipped. Fails only when the root is missing or no run at all
/// could be loaded.
pub fn load_runs(
    root: &Path,
    resolver: &IdentityResolver,
    options: &BatchOptions,
) -> Result<BatchOutcome, AnalysisError> {
    let logs = discover_logs(root)?;
    info!("Found {} traffic log(s) under {:?}", logs.len(), root);

    let threads = if options.jobs == 0 {
        get_cpu_cores()
    } else {
        options.jobs
    };
    debug!("Parsing with {} worker thread(s)", threads);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| AnalysisError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;

    let results: Vec<(PathBuf, Result<RunRecord, AnalysisError>)> = pool.install(|| {
        logs.par_iter()
            .map(|path| (path.clone(), load_run(path, resolver, &options.metrics)))
            .collect()
    });

    let mut records = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (log_path, result) in results {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Could not load {:?}: {}", log_path, e);
                skipped.push(SkippedRun {
                    log_path,
                    reason: e.to_string(),
                });
            }
        }
    }

    if records.is_empty() {
        return Err(AnalysisError::empty(format!(
            "traffic logs under {}",
            root.display()
        )));
    }

    info!("Loaded {} simulation result(s)", records.len());
    Ok(BatchOutcome {
        table: RunTable::collect(records),
        skipped,
    })
}
