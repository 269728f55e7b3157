//! # SOXIM Metrics Library
//!
//! Performance analysis for the SOXIM network-on-chip simulator. This library
//! turns the per-packet traffic logs a simulation run leaves behind into
//! latency and throughput metrics, and characterizes where each routing
//! algorithm saturates across a sweep of injection rates.
//!
//! ## Architecture Overview
//!
//! The pipeline runs leaf-first through these modules:
//!
//! - `event`: parses `TrafficInformation.csv` into typed packet events
//! - `metrics`: latency distribution, reception rate, per-node throughput
//! - `identity`: resolves algorithm, traffic pattern and injection rate of a run
//! - `aggregate`: batch loading of result trees into a labeled run table
//! - `saturation`: saturation points, peak throughput and throughput curves
//!
//! Presentation lives in `report` (console tables, JSON and CSV export) and
//! `cli`; the core modules only return data structures.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use soxim_metrics::{
//!     aggregate::{load_runs, BatchOptions},
//!     identity::{IdentityResolver, LabelRegistry},
//!     saturation::find_saturation_points,
//! };
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let resolver = IdentityResolver::new(&LabelRegistry::default())?;
//!     let batch = load_runs(Path::new("results"), &resolver, &BatchOptions::default())?;
//!
//!     for (algorithm, point) in find_saturation_points(&batch.table) {
//!         println!("{}: saturates at {:.3}", algorithm, point.saturation_rate);
//!     }
//!     Ok(())
//! }
//! ```

/// Batch loading and the labeled run table
///
/// Discovers traffic logs under a results directory, processes runs in
/// parallel, and offers filters by algorithm, traffic pattern and rate.
pub mod aggregate;

/// Command-line interface and configuration
///
/// Argument parsing using clap, converted into a validated `AnalysisConfig`.
pub mod cli;

pub mod error;

/// Traffic log parsing
pub mod event;

/// Run identity resolution from path segments and configuration text
pub mod identity;

pub mod logging;

/// Per-run statistics
///
/// Reception rate, latency summary with interpolated percentiles, latency
/// histogram, per-destination throughput and per-pair latency.
pub mod metrics;

/// Console reports and JSON/CSV result files
pub mod report;

/// Saturation point detection across injection-rate sweeps
pub mod saturation;

pub mod utils;

pub use aggregate::{RunRecord, RunTable};
pub use error::AnalysisError;
pub use event::{PacketEvent, PacketStatus};
pub use identity::{LabelRegistry, RunIdentity};
pub use metrics::{compute_metrics, RunMetrics};
pub use saturation::{find_saturation_points, SaturationDetector, SaturationPoint};

/// The current version of the analysis tool, recorded in result files
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// File name the simulator writes its per-packet log to
    pub const TRAFFIC_LOG_FILE: &str = "TrafficInformation.csv";

    /// Simulator configuration stored next to a run's log
    pub const CONFIG_FILE: &str = "config.toml";

    /// Share of peak throughput that marks saturation
    pub const SATURATION_THRESHOLD: f64 = 0.95;

    /// Percentile levels reported for every run
    pub const PERCENTILES: [f64; 3] = [50.0, 95.0, 99.0];

    /// Buckets in the latency distribution histogram
    pub const HISTOGRAM_BUCKETS: usize = 50;
}
