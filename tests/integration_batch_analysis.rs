use soxim_metrics::{
    aggregate::{load_runs, BatchOptions},
    identity::{IdentityResolver, IdentitySource, LabelRegistry},
    saturation::{find_saturation_points, SaturationDetector},
    AnalysisError,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "PacketID,Source,Destination,PacketSize,Status,SentTime,ReceivedTime,";

/// Write a traffic log with `received` of `total` packets delivered
fn write_log(dir: &Path, total: usize, received: usize, latency: f64) {
    fs::create_dir_all(dir).unwrap();
    let mut text = String::from(HEADER);
    text.push('\n');
    for i in 0..total {
        let source = i % 4;
        let destination = (i + 1) % 4;
        let sent = i as f64;
        if i < received {
            text.push_str(&format!(
                "{},{},{},4,R,{},{},\n",
                i,
                source,
                destination,
                sent,
                sent + latency
            ));
        } else {
            text.push_str(&format!("{},{},{},4,S,{},-,\n", i, source, destination, sent));
        }
    }
    fs::write(dir.join("TrafficInformation.csv"), text).unwrap();
}

fn resolver() -> IdentityResolver {
    IdentityResolver::new(&LabelRegistry::default()).unwrap()
}

fn sweep() -> TempDir {
    let root = TempDir::new().unwrap();
    let dor = root.path().join("DOR").join("random_uniform");
    write_log(&dor.join("rate0.1"), 100, 50, 10.0);
    write_log(&dor.join("rate0.2"), 100, 96, 20.0);
    write_log(&dor.join("rate0.3"), 100, 97, 40.0);

    let romm = root.path().join("ROMM").join("random_uniform");
    write_log(&romm.join("rate0.1"), 100, 60, 12.0);
    write_log(&romm.join("rate0.2"), 100, 80, 18.0);
    root
}

#[test]
fn test_batch_load_identifies_every_run() {
    let root = sweep();
    let batch = load_runs(root.path(), &resolver(), &BatchOptions::default()).unwrap();

    assert_eq!(batch.table.len(), 5);
    assert!(batch.skipped.is_empty());
    assert_eq!(batch.table.algorithms(), vec!["DOR", "ROMM"]);

    let first = &batch.table.records()[0];
    assert_eq!(first.identity.traffic_pattern, "random uniform");
    assert_eq!(first.identity.injection_rate, 0.1);
    assert_eq!(first.metrics.total, 100);
    assert_eq!(first.metrics.received, 50);
    assert_eq!(first.metrics.latency.mean, 10.0);
}

#[test]
fn test_malformed_log_is_skipped() {
    let root = sweep();
    let broken = root.path().join("VAL").join("permutation").join("rate0.1");
    fs::create_dir_all(&broken).unwrap();
    fs::write(
        broken.join("TrafficInformation.csv"),
        "PacketID,Source,Status\n1,0,R\n",
    )
    .unwrap();

    let batch = load_runs(root.path(), &resolver(), &BatchOptions::default()).unwrap();

    assert_eq!(batch.table.len(), 5);
    assert_eq!(batch.skipped.len(), 1);
    assert!(batch.skipped[0].log_path.starts_with(&broken));
    assert!(batch.table.retain_algorithm("VAL").is_empty());
}

#[test]
fn test_empty_results_directory() {
    let root = TempDir::new().unwrap();
    let result = load_runs(root.path(), &resolver(), &BatchOptions::default());
    assert!(matches!(result, Err(AnalysisError::EmptyResult { .. })));
}

#[test]
fn test_companion_config_fills_missing_identity() {
    let root = TempDir::new().unwrap();
    let run = root.path().join("run_0007");
    write_log(&run, 10, 10, 5.0);
    fs::write(
        run.join("config.toml"),
        "routing = \"ODD_EVEN\"\ntraffic = \"permutation\"\ninjection_rate = 0.35\n",
    )
    .unwrap();

    let options = BatchOptions {
        jobs: 1,
        ..BatchOptions::default()
    };
    let batch = load_runs(root.path(), &resolver(), &options).unwrap();
    let identity = &batch.table.records()[0].identity;

    assert_eq!(identity.algorithm, "ODD_EVEN");
    assert_eq!(identity.traffic_pattern, "permutation");
    assert_eq!(identity.injection_rate, 0.35);
    assert_eq!(identity.provenance.injection_rate, IdentitySource::Config);
}

#[test]
fn test_saturation_over_loaded_sweep() {
    let root = sweep();
    let batch = load_runs(root.path(), &resolver(), &BatchOptions::default()).unwrap();

    let points = find_saturation_points(&batch.table);
    let dor = &points["DOR"];
    assert_eq!(dor.saturation_rate, 0.2);
    assert_eq!(dor.latency_at_saturation, Some(20.0));
    assert!((dor.max_throughput - 97.0).abs() < 1e-9);

    assert_eq!(points["ROMM"].saturation_rate, 0.2);

    let only_dor = batch.table.filter_by_algorithm("DOR").unwrap();
    let curves = SaturationDetector::new().saturation_curves(&only_dor);
    assert_eq!(curves.len(), 1);
    assert_eq!(curves["DOR"].points.len(), 3);
    assert_eq!(curves["DOR"].slopes.len(), 2);
}

#[test]
fn test_rate_filter_after_batch_load() {
    let root = sweep();
    let batch = load_runs(root.path(), &resolver(), &BatchOptions::default()).unwrap();

    let at_rate = batch.table.filter_by_rates(&[0.1 + 0.2]).unwrap();
    assert_eq!(at_rate.len(), 1);
    assert_eq!(at_rate.records()[0].identity.algorithm, "DOR");

    assert!(matches!(
        batch.table.filter_by_pattern("transpose"),
        Err(AnalysisError::EmptyResult { .. })
    ));
}
