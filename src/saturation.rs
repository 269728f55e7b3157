//! # Saturation Detection
//!
//! Characterizes how each routing algorithm's throughput scales with offered
//! load. Runs are grouped by algorithm and ordered by injection rate; the
//! saturation rate is the first rate at which throughput reaches a fixed
//! share (95% by default) of the best throughput that algorithm achieved.
//!
//! The first-crossing rule is kept even for curves that dip and recover:
//! the reported rate is where the curve first gets close to its peak, which
//! is stable against a noisy maximum at high load.

use crate::aggregate::{RateKey, RunRecord, RunTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Saturation characterization of one algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaturationPoint {
    pub saturation_rate: f64,
    pub max_throughput: f64,
    /// Mean latency of the run at the saturation rate
    pub latency_at_saturation: Option<f64>,
}

/// Where an algorithm's throughput peaked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxThroughputEntry {
    pub max_throughput: f64,
    pub rate_at_max: f64,
    pub latency_at_max: f64,
}

/// One point of a throughput/latency versus injection rate curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub rate: f64,
    pub throughput: f64,
    pub mean_latency: f64,
}

/// Throughput gain per unit of injection rate between two curve points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSlope {
    pub from_rate: f64,
    pub to_rate: f64,
    pub slope: f64,
}

/// Rate-ordered curve of one algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaturationCurve {
    pub points: Vec<CurvePoint>,
    pub slopes: Vec<CurveSlope>,
}

/// Saturation analysis over a run table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaturationDetector {
    threshold: f64,
}

impl Default for SaturationDetector {
    fn default() -> Self {
        Self {
            threshold: crate::defaults::SATURATION_THRESHOLD,
        }
    }
}

/// Group runs by algorithm, each group stably sorted by ascending rate
fn group_by_algorithm(table: &RunTable) -> BTreeMap<&str, Vec<&RunRecord>> {
    let mut groups: BTreeMap<&str, Vec<&RunRecord>> = BTreeMap::new();
    for record in table {
        groups
            .entry(record.identity.algorithm.as_str())
            .or_default()
            .push(record);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.identity.injection_rate.total_cmp(&b.identity.injection_rate));
    }
    groups
}

fn max_throughput(group: &[&RunRecord]) -> f64 {
    group
        .iter()
        .map(|r| r.throughput())
        .fold(f64::NEG_INFINITY, f64::max)
}

impl SaturationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different share of peak throughput as the saturation threshold
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Saturation point of one rate-sorted algorithm group.
    ///
    /// Returns `None` when the group covers fewer than two distinct rates.
    fn saturation_of(&self, group: &[&RunRecord]) -> Option<SaturationPoint> {
        let distinct_rates: BTreeSet<RateKey> = group.iter().map(|r| r.rate_key()).collect();
        if distinct_rates.len() < 2 {
            return None;
        }

        let max_throughput = max_throughput(group);
        let threshold = max_throughput * self.threshold;

        let crossing = group.iter().find(|r| r.throughput() >= threshold)?;
        let saturation_rate = crossing.identity.injection_rate;

        let key = RateKey::new(saturation_rate);
        let latency_at_saturation = group
            .iter()
            .find(|r| r.rate_key() == key)
            .map(|r| r.metrics.latency.mean);

        Some(SaturationPoint {
            saturation_rate,
            max_throughput,
            latency_at_saturation,
        })
    }

    /// Find the saturation point of every algorithm in the table.
    ///
    /// Algorithms measured at fewer than two distinct rates are left out.
    pub fn find_saturation_points(&self, table: &RunTable) -> BTreeMap<String, SaturationPoint> {
        let mut points = BTreeMap::new();
        for (algorithm, group) in group_by_algorithm(table) {
            match self.saturation_of(&group) {
                Some(point) => {
                    points.insert(algorithm.to_string(), point);
                }
                None => debug!(
                    "Skipping saturation analysis for {}: fewer than two distinct rates",
                    algorithm
                ),
            }
        }
        points
    }

    /// Rate, throughput and latency of the run where each algorithm peaked.
    ///
    /// Unlike [`find_saturation_points`](Self::find_saturation_points) this
    /// reports the global maximum and includes single-run algorithms. Ties
    /// go to the lowest rate.
    pub fn max_throughput_summary(&self, table: &RunTable) -> BTreeMap<String, MaxThroughputEntry> {
        let mut summary = BTreeMap::new();
        for (algorithm, group) in group_by_algorithm(table) {
            let max = max_throughput(&group);
            if let Some(peak) = group.iter().find(|r| r.throughput() == max) {
                summary.insert(
                    algorithm.to_string(),
                    MaxThroughputEntry {
                        max_throughput: max,
                        rate_at_max: peak.identity.injection_rate,
                        latency_at_max: peak.metrics.latency.mean,
                    },
                );
            }
        }
        summary
    }

    /// Rate-ordered throughput curves with finite-difference slopes
    pub fn saturation_curves(&self, table: &RunTable) -> BTreeMap<String, SaturationCurve> {
        group_by_algorithm(table)
            .into_iter()
            .map(|(algorithm, group)| {
                let points: Vec<CurvePoint> = group
                    .iter()
                    .map(|r| CurvePoint {
                        rate: r.identity.injection_rate,
                        throughput: r.throughput(),
                        mean_latency: r.metrics.latency.mean,
                    })
                    .collect();

                let slopes = points
                    .windows(2)
                    .filter(|pair| pair[1].rate > pair[0].rate)
                    .map(|pair| CurveSlope {
                        from_rate: pair[0].rate,
                        to_rate: pair[1].rate,
                        slope: (pair[1].throughput - pair[0].throughput)
                            / (pair[1].rate - pair[0].rate),
                    })
                    .collect();

                (algorithm.to_string(), SaturationCurve { points, slopes })
            })
            .collect()
    }
}

/// Saturation points with the default 95% threshold
pub fn find_saturation_points(table: &RunTable) -> BTreeMap<String, SaturationPoint> {
    SaturationDetector::default().find_saturation_points(table)
}

/// Peak-throughput summary per algorithm
pub fn max_throughput_summary(table: &RunTable) -> BTreeMap<String, MaxThroughputEntry> {
    SaturationDetector::default().max_throughput_summary(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::event::{PacketEvent, PacketStatus};
    use crate::identity::RunIdentity;
    use crate::metrics::MetricsOptions;
    use std::path::Path;

    /// A run of 100 packets with `received` delivered at `latency` cycles
    fn run(algorithm: &str, rate: f64, received: usize, latency: f64) -> RunRecord {
        let events: Vec<PacketEvent> = (0..100)
            .map(|i| {
                if i < received {
                    PacketEvent::new(0, 1, Some(0.0), Some(latency), PacketStatus::Received)
                } else {
                    PacketEvent::new(0, 1, Some(0.0), None, PacketStatus::Sent)
                }
            })
            .collect();
        aggregate(
            Path::new("TrafficInformation.csv"),
            &events,
            RunIdentity::new(algorithm, "random uniform", rate),
            &MetricsOptions::default(),
        )
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_first_crossing_not_maximum() {
        let table = RunTable::collect(vec![
            run("DOR", 0.3, 97, 30.0),
            run("DOR", 0.1, 50, 10.0),
            run("DOR", 0.2, 96, 20.0),
        ]);
        let points = find_saturation_points(&table);
        let dor = &points["DOR"];

        assert_close(dor.max_throughput, 97.0);
        assert_eq!(dor.saturation_rate, 0.2);
        assert_eq!(dor.latency_at_saturation, Some(20.0));

        let summary = max_throughput_summary(&table);
        assert_eq!(summary["DOR"].rate_at_max, 0.3);
        assert_eq!(summary["DOR"].latency_at_max, 30.0);
    }

    #[test]
    fn test_non_monotonic_curve_reports_first_crossing() {
        let table = RunTable::collect(vec![
            run("ROMM", 0.1, 40, 5.0),
            run("ROMM", 0.2, 90, 8.0),
            run("ROMM", 0.3, 60, 30.0),
            run("ROMM", 0.4, 92, 50.0),
        ]);
        let points = find_saturation_points(&table);

        assert_eq!(points["ROMM"].saturation_rate, 0.2);
        assert_close(points["ROMM"].max_throughput, 92.0);
    }

    #[test]
    fn test_single_rate_group_is_skipped() {
        let table = RunTable::collect(vec![
            run("MAD", 0.1, 80, 5.0),
            run("MAD", 0.1, 85, 6.0),
            run("VAL", 0.1, 50, 5.0),
            run("VAL", 0.2, 70, 9.0),
        ]);
        let points = find_saturation_points(&table);

        assert!(!points.contains_key("MAD"));
        assert!(points.contains_key("VAL"));

        let summary = max_throughput_summary(&table);
        assert_close(summary["MAD"].max_throughput, 85.0);
    }

    #[test]
    fn test_custom_threshold() {
        let table = RunTable::collect(vec![
            run("DOR", 0.1, 50, 10.0),
            run("DOR", 0.2, 80, 20.0),
            run("DOR", 0.3, 100, 30.0),
        ]);
        let detector = SaturationDetector::with_threshold(0.5);
        assert_eq!(detector.threshold(), 0.5);
        assert_eq!(detector.find_saturation_points(&table)["DOR"].saturation_rate, 0.1);
    }

    #[test]
    fn test_curves_and_slopes() {
        let table = RunTable::collect(vec![
            run("DOR", 0.2, 60, 20.0),
            run("DOR", 0.1, 40, 10.0),
            run("DOR", 0.2, 62, 21.0),
        ]);
        let curves = SaturationDetector::new().saturation_curves(&table);
        let dor = &curves["DOR"];

        assert_eq!(dor.points.len(), 3);
        assert_eq!(dor.points[0].rate, 0.1);
        assert_eq!(dor.slopes.len(), 1);
        assert_eq!(dor.slopes[0].from_rate, 0.1);
        assert!((dor.slopes[0].slope - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_table() {
        let table = RunTable::default();
        assert!(find_saturation_points(&table).is_empty());
        assert!(max_throughput_summary(&table).is_empty());
    }
}
