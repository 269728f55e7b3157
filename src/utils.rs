//! # Utility Functions and Helper Module
//!
//! Numeric helpers shared by the statistics engine and the saturation
//! detector, validators for user-supplied configuration, and the small
//! formatting and table-printing helpers used by the console reports.
//!
//! ## Key Functionality Categories
//!
//! - **Statistics**: mean, extrema, sample standard deviation, percentiles
//! - **Validation**: configuration parameter checks with clear error messages
//! - **Formatting**: cycle counts, percentages and injection rates
//! - **Display Helpers**: fixed-width console tables
//!
//! ## Usage Examples
//!
//! ```rust
//! use soxim_metrics::utils::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let (mean, min, max, _std_dev) = calculate_stats(&[1.0, 2.0, 3.0]);
//! assert_eq!((mean, min, max), (2.0, 1.0, 3.0));
//!
//! assert_eq!(format_cycles(12.5), "12.50 cycles");
//! validate_threshold(0.95)?; // OK
//! # Ok(())
//! # }
//! ```

use anyhow::Result;

/// Calculate basic statistics for a set of values
///
/// Returns `(mean, min, max, std_dev)`.
///
/// ## Empty Dataset Handling
///
/// If the input slice is empty, returns (0.0, 0.0, 0.0, 0.0) so that callers
/// always receive finite numbers.
///
/// ## Standard Deviation Calculation
///
/// Uses the sample standard deviation formula:
/// s = √(Σ(x - μ)² / (N - 1))
///
/// A single value has no spread and yields 0.0.
///
/// ## Examples
///
/// ```rust
/// # use soxim_metrics::utils::calculate_stats;
/// let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
/// let (mean, min, max, std_dev) = calculate_stats(&values);
/// assert_eq!(mean, 3.0);
/// assert_eq!(min, 1.0);
/// assert_eq!(max, 5.0);
/// // std_dev ≈ 1.581
/// ```
pub fn calculate_stats(values: &[f64]) -> (f64, f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let sum: f64 = values.iter().sum();
    let count = values.len() as f64;
    let mean = sum / count;

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let std_dev = if values.len() > 1 {
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1.0);
        variance.sqrt()
    } else {
        0.0
    };

    (mean, min, max, std_dev)
}

/// Percentile of an already sorted slice
///
/// Inclusive linear interpolation between order statistics: for percentile
/// P over N values the fractional rank is `(P/100) * (N-1)`, and the result
/// interpolates between the two neighbouring order statistics. P is clamped
/// to [0, 100]; an empty slice yields 0.0.
pub fn percentile_of_sorted(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let p = percentile.clamp(0.0, 100.0);
    let index = (p / 100.0) * (sorted_values.len() - 1) as f64;
    let lower_index = index.floor() as usize;
    let upper_index = index.ceil() as usize;

    if lower_index == upper_index {
        sorted_values[lower_index]
    } else {
        let lower_value = sorted_values[lower_index];
        let upper_value = sorted_values[upper_index];
        let weight = index - lower_index as f64;
        lower_value + weight * (upper_value - lower_value)
    }
}

/// Calculate percentiles from a vector of values
///
/// Sorts a copy of the data and evaluates each requested percentile with
/// [`percentile_of_sorted`].
///
/// ## Returns
/// Vector of (percentile, value) tuples for each requested percentile. An
/// empty dataset pairs every requested level with 0.0.
///
/// ## Examples
///
/// ```rust
/// # use soxim_metrics::utils::calculate_percentiles;
/// let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
/// let percentiles = calculate_percentiles(&values, &[50.0, 95.0]);
/// assert_eq!(percentiles[0], (50.0, 3.0));
/// assert!((percentiles[1].1 - 4.8).abs() < 1e-12);
/// ```
pub fn calculate_percentiles(values: &[f64], percentiles: &[f64]) -> Vec<(f64, f64)> {
    let mut sorted_values = values.to_vec();
    sorted_values.sort_by(|a, b| a.total_cmp(b));

    percentiles
        .iter()
        .map(|&p| (p, percentile_of_sorted(&sorted_values, p)))
        .collect()
}

/// Validate the saturation threshold fraction
///
/// The threshold is the share of an algorithm's peak throughput a run must
/// reach to count as saturated; it must lie in (0, 1].
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        anyhow::bail!(
            "Saturation threshold {} must be greater than 0 and at most 1",
            threshold
        );
    }
    Ok(())
}

/// Validate the number of latency histogram buckets
pub fn validate_bucket_count(buckets: usize) -> Result<()> {
    if buckets == 0 {
        anyhow::bail!("Histogram bucket count must be at least 1");
    }
    if buckets > 10_000 {
        anyhow::bail!("Histogram bucket count {} is too large (max 10000)", buckets);
    }
    Ok(())
}

/// Validate injection rates given on the command line
pub fn validate_rates(rates: &[f64]) -> Result<()> {
    if let Some(rate) = rates.iter().find(|r| !r.is_finite() || **r < 0.0) {
        anyhow::bail!("Injection rate {} must be a finite, non-negative number", rate);
    }
    Ok(())
}

/// Number of logical CPUs, used as the default worker count
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

/// Format a latency in simulator cycles
pub fn format_cycles(cycles: f64) -> String {
    format!("{:.2} cycles", cycles)
}

/// Format a percentage with two decimals
pub fn format_percent(percent: f64) -> String {
    format!("{:.2}%", percent)
}

/// Format an injection rate with three decimals
pub fn format_rate(rate: f64) -> String {
    format!("{:.3}", rate)
}

/// Format an optional value, using "-" when absent
pub fn format_optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

/// Print a table row with consistent column widths
///
/// ## Examples
///
/// ```rust
/// # use soxim_metrics::utils::{print_table_row, print_table_separator};
/// let widths = [15, 15, 15];
/// print_table_separator(&widths);
/// print_table_row(&["Algorithm", "Max Throughput", "Saturation Rate"], &widths);
/// print_table_separator(&widths);
/// print_table_row(&["DOR", "97.00", "0.200"], &widths);
/// print_table_separator(&widths);
/// ```
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    print!("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        print!(" {:width$} |", column, width = width);
    }
    println!();
}

/// Print a table separator
///
/// ```text
/// +-----------------+-----------------+
/// | Algorithm       | Saturation Rate |
/// +-----------------+-----------------+
/// ```
pub fn print_table_separator(widths: &[usize]) {
    print!("+");
    for &width in widths {
        print!("{}", "-".repeat(width + 2));
        print!("+");
    }
    println!();
}
