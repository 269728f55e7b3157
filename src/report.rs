//! # Reports and Result Files
//!
//! Console tables for single runs, run comparisons and saturation analysis,
//! plus the [`ResultsManager`] that writes analysis results to JSON and the
//! processed per-run table to CSV.

use crate::aggregate::{RunRecord, RunTable, SkippedRun};
use crate::metrics::RunMetrics;
use crate::saturation::{MaxThroughputEntry, SaturationCurve, SaturationDetector, SaturationPoint};
use crate::utils::{
    format_cycles, format_optional, format_percent, format_rate, print_table_row,
    print_table_separator,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

const SATURATION_WIDTHS: [usize; 4] = [15, 15, 15, 15];

/// Print the statistics of one run
pub fn print_run_report(metrics: &RunMetrics) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("SOXIM SIMULATION RESULTS");
    println!("{}", rule);

    println!("\nPACKET STATISTICS:");
    println!("  Total packets generated:  {}", metrics.total);
    println!("  Packets sent:             {}", metrics.sent);
    println!("  Packets received:         {}", metrics.received);
    println!("  Reception rate:           {}", format_percent(metrics.reception_rate));
    if metrics.other > 0 {
        println!("  Other status:             {}", metrics.other);
    }
    if metrics.malformed > 0 {
        println!("  Without latency:          {}", metrics.malformed);
    }

    let latency = &metrics.latency;
    println!("\nLATENCY STATISTICS:");
    println!("  Average latency:          {}", format_cycles(latency.mean));
    println!("  Min latency:              {}", format_cycles(latency.min));
    println!("  Max latency:              {}", format_cycles(latency.max));
    println!("  Median latency:           {}", format_cycles(latency.median));
    println!("  Std deviation:            {}", format_cycles(latency.std_dev));
    for p in &latency.percentiles {
        println!(
            "  P{:<24}{}",
            format!("{}:", p.percentile),
            format_cycles(p.value)
        );
    }

    println!("\nNETWORK TRAFFIC:");
    println!("  Unique sources:           {}", metrics.unique_sources);
    println!("  Unique destinations:      {}", metrics.unique_destinations);

    if let Some((node, count)) = metrics.busiest_destination() {
        println!("  Busiest destination:      node {} ({} packets)", node, count);
    }

    println!("\n{}", rule);
}

/// A run shown in a comparison, with the label it is shown under
#[derive(Debug, Clone)]
pub struct LabeledRun {
    pub label: String,
    pub record: RunRecord,
}

/// Print runs side by side
pub fn print_comparison(runs: &[LabeledRun]) {
    let rule = "=".repeat(80);
    println!("\n{}", rule);
    println!("COMPARISON RESULTS");
    println!("{}", rule);
    println!(
        "{:<20} {:<10} {:<10} {:<8} {:<12}",
        "Configuration", "Total", "Received", "%", "Avg Latency"
    );
    println!("{}", "-".repeat(80));

    for run in runs {
        let metrics = &run.record.metrics;
        println!(
            "{:<20} {:<10} {:<10} {:<8.1} {:<12.2}",
            run.label, metrics.total, metrics.received, metrics.reception_rate, metrics.latency.mean
        );
    }
}

/// Print peak throughput and saturation points per algorithm
pub fn print_saturation_analysis(table: &RunTable, detector: &SaturationDetector) {
    let summary = detector.max_throughput_summary(table);
    let points = detector.find_saturation_points(table);

    println!("\nSATURATION ANALYSIS");
    print_table_separator(&SATURATION_WIDTHS);
    print_table_row(
        &["Algorithm", "Max Throughput", "Rate at Max", "Latency at Max"],
        &SATURATION_WIDTHS,
    );
    print_table_separator(&SATURATION_WIDTHS);
    for (algorithm, entry) in &summary {
        print_table_row(
            &[
                algorithm.as_str(),
                &format!("{:.2}", entry.max_throughput),
                &format_rate(entry.rate_at_max),
                &format!("{:.2}", entry.latency_at_max),
            ],
            &SATURATION_WIDTHS,
        );
    }
    print_table_separator(&SATURATION_WIDTHS);

    if points.is_empty() {
        println!(
            "\nNo saturation points: every algorithm was measured at fewer than two injection rates"
        );
        return;
    }

    println!(
        "\nSATURATION POINTS ({:.0}% of peak throughput)",
        detector.threshold() * 100.0
    );
    print_table_separator(&SATURATION_WIDTHS);
    print_table_row(
        &["Algorithm", "Saturation Rate", "Max Throughput", "Latency"],
        &SATURATION_WIDTHS,
    );
    print_table_separator(&SATURATION_WIDTHS);
    for (algorithm, point) in &points {
        print_table_row(
            &[
                algorithm.as_str(),
                &format_rate(point.saturation_rate),
                &format!("{:.2}", point.max_throughput),
                &format_optional(point.latency_at_saturation, 2),
            ],
            &SATURATION_WIDTHS,
        );
    }
    print_table_separator(&SATURATION_WIDTHS);
}

/// Metadata stored with every result file
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_runs: usize,
    pub skipped_runs: Vec<SkippedRun>,
    pub saturation_threshold: Option<f64>,
}

/// Saturation section of a result file
#[derive(Debug, Serialize, Deserialize)]
pub struct SaturationReport {
    pub saturation_points: BTreeMap<String, SaturationPoint>,
    pub max_throughput: BTreeMap<String, MaxThroughputEntry>,
    pub curves: BTreeMap<String, SaturationCurve>,
}

/// Complete result document
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub metadata: ReportMetadata,
    pub runs: Vec<RunRecord>,
    pub saturation: Option<SaturationReport>,
}

/// One row of the processed-data CSV
#[derive(Debug, Serialize)]
struct ProcessedRow<'a> {
    file: &'a Path,
    algorithm: &'a str,
    pattern: &'a str,
    rate: f64,
    throughput: f64,
    avg_latency: f64,
    max_latency: f64,
    received_packets: usize,
    total_packets: usize,
}

impl<'a> From<&'a RunRecord> for ProcessedRow<'a> {
    fn from(record: &'a RunRecord) -> Self {
        Self {
            file: &record.log_path,
            algorithm: &record.identity.algorithm,
            pattern: &record.identity.traffic_pattern,
            rate: record.identity.injection_rate,
            throughput: record.throughput(),
            avg_latency: record.metrics.latency.mean,
            max_latency: record.metrics.latency.max,
            received_packets: record.metrics.received,
            total_packets: record.metrics.total,
        }
    }
}

/// Collects analyzed runs and writes them to disk
pub struct ResultsManager {
    output_file: PathBuf,
    runs: Vec<RunRecord>,
    skipped: Vec<SkippedRun>,
    saturation: Option<(f64, SaturationReport)>,
}

impl ResultsManager {
    /// Create a new results manager writing to `output_file`
    pub fn new(output_file: &Path) -> Self {
        Self {
            output_file: output_file.to_path_buf(),
            runs: Vec::new(),
            skipped: Vec::new(),
            saturation: None,
        }
    }

    pub fn add_run(&mut self, record: RunRecord) {
        self.runs.push(record);
    }

    pub fn add_table(&mut self, table: &RunTable) {
        self.runs.extend(table.iter().cloned());
    }

    pub fn add_skipped(&mut self, skipped: &[SkippedRun]) {
        self.skipped.extend_from_slice(skipped);
    }

    /// Attach saturation analysis of `table` to the result document
    pub fn add_saturation(&mut self, table: &RunTable, detector: &SaturationDetector) {
        let report = SaturationReport {
            saturation_points: detector.find_saturation_points(table),
            max_throughput: detector.max_throughput_summary(table),
            curves: detector.saturation_curves(table),
        };
        self.saturation = Some((detector.threshold(), report));
    }

    /// Write the JSON result document
    pub fn finalize(self) -> Result<()> {
        let (saturation_threshold, saturation) = match self.saturation {
            Some((threshold, report)) => (Some(threshold), Some(report)),
            None => (None, None),
        };

        let results = AnalysisResults {
            metadata: ReportMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                total_runs: self.runs.len(),
                skipped_runs: self.skipped,
                saturation_threshold,
            },
            runs: self.runs,
            saturation,
        };

        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write results to {:?}", self.output_file))?;

        info!("Results written to: {:?}", self.output_file);
        Ok(())
    }
}

/// Write one row per run to `<output>.saturation.csv` and return that path
pub fn save_processed_data(table: &RunTable, output: &Path) -> Result<PathBuf> {
    let path = output.with_extension("saturation.csv");
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    for record in table {
        writer.serialize(ProcessedRow::from(record))?;
    }
    writer.flush()?;

    info!("Processed data saved to: {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::event::{PacketEvent, PacketStatus};
    use crate::identity::RunIdentity;
    use crate::metrics::MetricsOptions;
    use tempfile::tempdir;

    fn record(algorithm: &str, rate: f64, received: usize) -> RunRecord {
        let events: Vec<PacketEvent> = (0..10)
            .map(|i| {
                if i < received {
                    PacketEvent::new(i as i64, 0, Some(0.0), Some(4.0), PacketStatus::Received)
                } else {
                    PacketEvent::new(i as i64, 0, Some(0.0), None, PacketStatus::Sent)
                }
            })
            .collect();
        aggregate(
            Path::new("runs/TrafficInformation.csv"),
            &events,
            RunIdentity::new(algorithm, "random uniform", rate),
            &MetricsOptions::default(),
        )
    }

    fn table() -> RunTable {
        RunTable::collect(vec![record("DOR", 0.1, 5), record("DOR", 0.2, 9)])
    }

    #[test]
    fn test_results_manager_writes_json() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("results.json");

        let mut manager = ResultsManager::new(&output);
        manager.add_table(&table());
        manager.add_skipped(&[SkippedRun {
            log_path: PathBuf::from("broken/TrafficInformation.csv"),
            reason: "missing column".to_string(),
        }]);
        manager.add_saturation(&table(), &SaturationDetector::default());
        manager.finalize().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(json["metadata"]["version"], crate::VERSION);
        assert_eq!(json["metadata"]["total_runs"], 2);
        assert_eq!(json["metadata"]["skipped_runs"].as_array().unwrap().len(), 1);
        assert_eq!(json["runs"][1]["identity"]["algorithm"], "DOR");
        assert_eq!(
            json["saturation"]["saturation_points"]["DOR"]["saturation_rate"],
            0.2
        );
    }

    #[test]
    fn test_results_manager_without_saturation() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("run.json");

        let mut manager = ResultsManager::new(&output);
        manager.add_run(record("ROMM", 0.1, 10));
        manager.finalize().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert!(json["saturation"].is_null());
        assert_eq!(json["runs"][0]["metrics"]["reception_rate"], 100.0);
    }

    #[test]
    fn test_save_processed_data() {
        let dir = tempdir().unwrap();
        let path = save_processed_data(&table(), &dir.path().join("sweep")).unwrap();
        assert_eq!(path, dir.path().join("sweep.saturation.csv"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[1], "algorithm");
        assert_eq!(&headers[4], "throughput");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][3], "0.2");
        assert_eq!(&rows[1][4], "90.0");
    }
}
