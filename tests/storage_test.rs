//! Storage round trips: JSON summary records and Parquet trial tables

use cic_sim::distribution::DistributionSpec;
use cic_sim::experiment::{ExperimentSpec, GroupDistributions, GroupSizes};
use cic_sim::runner::{ReplicationRunner, RunOptions, TrialRow};
use cic_sim::storage::{self, SummaryStore};
use cic_sim::SummaryRecord;
use tempfile::TempDir;

fn spec(name: &str, n: usize) -> ExperimentSpec {
    let model = GroupDistributions::location_shift(DistributionSpec::normal(0.0, 1.0), 0.5, 0.25, 1.0);
    ExperimentSpec::builder(name, GroupSizes::uniform(n), model)
        .replications(20)
        .bootstrap_resamples(20)
        .base_seed(3)
        .min_success_fraction(0.5)
        .build()
        .unwrap()
}

fn summary(name: &str, n: usize) -> SummaryRecord {
    cic_sim::run_experiment(&spec(name, n)).unwrap()
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() <= 1e-12 * a.abs().max(1.0), "{a} != {b}");
}

#[test]
fn test_file_name_encodes_design() {
    let record = summary("normal_shift", 120);
    assert_eq!(SummaryStore::file_name(&record), "normal_shift_n=120_R=20_B=20.json");
}

#[test]
fn test_summary_round_trip() {
    let dir = TempDir::new().unwrap();
    let record = summary("round_trip", 200);
    let path = SummaryStore::save(&record, dir.path()).unwrap();
    assert!(path.exists());

    let loaded = SummaryStore::load(&path).unwrap();
    assert_eq!(loaded.name(), record.name());
    assert_eq!(loaded.spec().replications(), record.spec().replications());
    assert_eq!(loaded.spec().sizes(), record.spec().sizes());
    assert_eq!(loaded.sample_size(), record.sample_size());
    assert_eq!(loaded.successful(), record.successful());
    assert_eq!(loaded.failures(), record.failures());
    assert_eq!(loaded.crate_version(), record.crate_version());
    assert_close(loaded.true_effect(), record.true_effect());
    assert_close(loaded.bias(), record.bias());
    assert_close(loaded.rmse(), record.rmse());
    assert_close(loaded.scaled_error_q95(), record.scaled_error_q95());
    assert_eq!(
        loaded.scaled_error_histogram().counts(),
        record.scaled_error_histogram().counts()
    );
    assert_eq!(loaded.coverage().len(), record.coverage().len());
    for (a, b) in loaded.coverage().iter().zip(record.coverage()) {
        assert_close(a.asymptotic, b.asymptotic);
        assert_close(a.bootstrap_mean_width, b.bootstrap_mean_width);
    }
}

#[test]
fn test_save_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let path = SummaryStore::save(&summary("nested", 100), &nested).unwrap();
    assert!(path.starts_with(&nested));
}

#[test]
fn test_load_dir_groups_by_experiment() {
    let dir = TempDir::new().unwrap();
    for (name, n) in [("beta", 300), ("alpha", 200), ("alpha", 100), ("beta", 150)] {
        SummaryStore::save(&summary(name, n), dir.path()).unwrap();
    }
    // Non-record files are ignored.
    std::fs::write(dir.path().join("notes.txt"), "not a record").unwrap();

    let store = SummaryStore::load_dir(dir.path()).unwrap();
    assert_eq!(store.len(), 4);
    assert_eq!(store.experiments(), vec!["alpha", "beta"]);
    let sizes: Vec<usize> = store.records_for("alpha").iter().map(|r| r.sample_size()).collect();
    assert_eq!(sizes, vec![100, 200]);
    let sizes: Vec<usize> = store.records_for("beta").iter().map(|r| r.sample_size()).collect();
    assert_eq!(sizes, vec![150, 300]);
    assert!(store.records_for("gamma").is_empty());
}

#[test]
fn test_load_dir_rejects_corrupt_record() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    assert!(matches!(
        SummaryStore::load_dir(dir.path()),
        Err(cic_sim::Error::Json(_))
    ));
}

#[test]
fn test_trial_table_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trials.parquet");
    let rows = vec![
        TrialRow {
            index: 0,
            seed: 11,
            estimate: Some(1.02),
            std_error: Some(0.12),
            bootstrap_std_error: Some(0.13),
            bandwidth: Some(0.21),
            discarded_draws: 0,
            failure: None,
        },
        TrialRow {
            index: 1,
            seed: 12,
            estimate: None,
            std_error: None,
            bootstrap_std_error: None,
            bandwidth: None,
            discarded_draws: 0,
            failure: Some("out_of_support".into()),
        },
    ];
    storage::write_trial_table(&path, &rows).unwrap();
    assert_eq!(storage::read_trial_table(&path).unwrap(), rows);
}

#[test]
fn test_runner_diagnostics_to_parquet() {
    let dir = TempDir::new().unwrap();
    let runner = ReplicationRunner::new(spec("diagnostics", 150)).unwrap();
    let artifacts = runner
        .run(&RunOptions {
            diagnostics: true,
            ..RunOptions::default()
        })
        .unwrap();
    assert_eq!(artifacts.trials.len(), 20);

    let path = dir.path().join("diagnostics.trials.parquet");
    storage::write_trial_table(&path, &artifacts.trials).unwrap();
    let rows = storage::read_trial_table(&path).unwrap();
    assert_eq!(rows, artifacts.trials);
    let indices: Vec<u64> = rows.iter().map(|r| r.index).collect();
    assert_eq!(indices, (0..20).collect::<Vec<u64>>());
}
