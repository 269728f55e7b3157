use crate::event::{NodeId, PacketEvent, PacketStatus};
use crate::utils::{calculate_stats, percentile_of_sorted};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Percentile value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

/// Latency distribution over the received packets of one run, in cycles
///
/// All fields are 0 when the run delivered no packet with a defined latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub std_dev: f64,
    pub p95: f64,
    pub p99: f64,
    pub percentiles: Vec<PercentileValue>,
}

/// Equal-width latency buckets spanning the observed range
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyHistogram {
    pub lower_bound: f64,
    pub bucket_width: f64,
    pub counts: Vec<u64>,
}

impl LatencyHistogram {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Mean latency of one (source, destination) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairLatency {
    pub source: NodeId,
    pub destination: NodeId,
    pub mean_latency: f64,
    pub samples: usize,
}

/// Aggregate metrics for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total: usize,
    pub sent: usize,
    pub received: usize,
    /// Rows whose status is neither sent nor received
    pub other: usize,
    /// Received rows without a usable latency
    pub malformed: usize,
    /// Received share of all packets, in percent
    pub reception_rate: f64,
    pub latency: LatencySummary,
    /// Received packets per destination node; absent nodes received none
    pub throughput_per_destination: BTreeMap<NodeId, usize>,
    pub unique_sources: usize,
    pub unique_destinations: usize,
    pub pair_latency: Vec<PairLatency>,
    pub latency_histogram: LatencyHistogram,
}

impl RunMetrics {
    /// Throughput used for saturation analysis (reception rate, percent)
    pub fn throughput(&self) -> f64 {
        self.reception_rate
    }

    /// Destination that received the most packets; ties go to the lowest id
    pub fn busiest_destination(&self) -> Option<(NodeId, usize)> {
        self.throughput_per_destination
            .iter()
            .min_by_key(|(_, count)| Reverse(**count))
            .map(|(&node, &count)| (node, count))
    }
}

/// Tunables for the statistics engine
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsOptions {
    /// Extra percentile levels reported in `LatencySummary::percentiles`
    pub percentiles: Vec<f64>,
    pub histogram_buckets: usize,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            percentiles: crate::defaults::PERCENTILES.to_vec(),
            histogram_buckets: crate::defaults::HISTOGRAM_BUCKETS,
        }
    }
}

/// Latency collector accumulating received-packet latencies
pub struct LatencyCollector {
    samples: Vec<f64>,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    /// Record a latency measurement in cycles
    pub fn record(&mut self, latency: f64) {
        self.samples.push(latency);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Summarize the recorded latencies
    pub fn get_metrics(&self, percentiles: &[f64]) -> LatencySummary {
        let (mean, min, max, std_dev) = calculate_stats(&self.samples);

        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let percentile_values = percentiles
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value: percentile_of_sorted(&sorted, p),
            })
            .collect();

        LatencySummary {
            samples: sorted.len(),
            mean,
            min,
            max,
            median: percentile_of_sorted(&sorted, 50.0),
            std_dev,
            p95: percentile_of_sorted(&sorted, 95.0),
            p99: percentile_of_sorted(&sorted, 99.0),
            percentiles: percentile_values,
        }
    }

    /// Bucket the recorded latencies for distribution charts.
    ///
    /// Latencies are rounded to whole cycles and folded into `buckets`
    /// equal-width bins spanning exactly the smallest to the largest value.
    pub fn get_histogram(&self, buckets: usize) -> LatencyHistogram {
        if self.samples.is_empty() || buckets == 0 {
            return LatencyHistogram::default();
        }

        let cycles: Vec<f64> = self.samples.iter().map(|latency| latency.round()).collect();
        let low = cycles.iter().copied().fold(f64::INFINITY, f64::min);
        let high = cycles.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let (bucket_count, bucket_width) = if high > low {
            (buckets, (high - low) / buckets as f64)
        } else {
            (1, 1.0)
        };

        let mut counts = vec![0u64; bucket_count];
        for value in cycles {
            let index = (((value - low) / bucket_width) as usize).min(bucket_count - 1);
            counts[index] += 1;
        }

        LatencyHistogram {
            lower_bound: low,
            bucket_width,
            counts,
        }
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute run metrics with default options
pub fn compute_metrics(events: &[PacketEvent]) -> RunMetrics {
    compute_metrics_with(events, &MetricsOptions::default())
}

/// Compute run metrics from the packet events of one run.
///
/// Never fails: an empty run yields all-zero counts and latency aggregates.
pub fn compute_metrics_with(events: &[PacketEvent], options: &MetricsOptions) -> RunMetrics {
    let mut sent = 0;
    let mut received = 0;
    let mut other = 0;
    let mut malformed = 0;

    let mut collector = LatencyCollector::new();
    let mut throughput_per_destination = BTreeMap::new();
    let mut pairs: BTreeMap<(NodeId, NodeId), (f64, usize)> = BTreeMap::new();
    let mut sources = BTreeSet::new();
    let mut destinations = BTreeSet::new();

    for event in events {
        sources.insert(event.source);
        destinations.insert(event.destination);

        match event.status {
            PacketStatus::Sent => sent += 1,
            PacketStatus::Other(_) => other += 1,
            PacketStatus::Received => {
                received += 1;
                *throughput_per_destination.entry(event.destination).or_insert(0) += 1;

                match event.latency() {
                    Some(latency) => {
                        collector.record(latency);
                        let pair = pairs
                            .entry((event.source, event.destination))
                            .or_insert((0.0, 0));
                        pair.0 += latency;
                        pair.1 += 1;
                    }
                    None => malformed += 1,
                }
            }
        }
    }

    let total = events.len();
    let reception_rate = if total > 0 {
        received as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    if malformed > 0 {
        debug!("{} received packet(s) have no usable latency", malformed);
    }

    let pair_latency = pairs
        .into_iter()
        .map(|((source, destination), (sum, samples))| PairLatency {
            source,
            destination,
            mean_latency: sum / samples as f64,
            samples,
        })
        .collect();

    RunMetrics {
        total,
        sent,
        received,
        other,
        malformed,
        reception_rate,
        latency: collector.get_metrics(&options.percentiles),
        throughput_per_destination,
        unique_sources: sources.len(),
        unique_destinations: destinations.len(),
        pair_latency,
        latency_histogram: collector.get_histogram(options.histogram_buckets),
    }
}
