//! End-to-end tests on a small synthetic digit set written as IDX files.
//!
//! Each "digit" is a 4x4 image with two pixels fixed by its class plus a
//! little salt noise, so models can learn it within a few epochs.

use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use associative_dbn::config::{load_json, save_json};
use associative_dbn::data::idx::encode_idx_pair;
use associative_dbn::data::loader::{TEST_IMAGES, TEST_LABELS, TRAIN_IMAGES, TRAIN_LABELS};
use associative_dbn::data::{load_digits, DigitSource, LoadOptions, Preprocess};
use associative_dbn::dbn::{AdbnConfig, DbnConfig};
use associative_dbn::experiment::{
    label_association, parity_adbn, parity_association, LabelAssociationConfig, ParityAdbnConfig,
    ParityAssociationConfig, ResultsLog,
};
use associative_dbn::{Matrix, Rbm, RbmConfig, TrainParam};

const SIDE: usize = 4;

fn digit_images(n: usize, rng: &mut StdRng) -> (Matrix, Vec<usize>) {
    let labels: Vec<usize> = (0..n).map(|i| i % 10).collect();
    let mut data = Vec::with_capacity(n * SIDE * SIDE);
    for &label in &labels {
        for px in 0..SIDE * SIDE {
            let on = px == label || px == 15 - label / 2;
            let noise = rng.gen::<f64>() < 0.02;
            data.push(if on ^ noise { 1.0 } else { 0.0 });
        }
    }
    (Matrix::from_vec(n, SIDE * SIDE, data), labels)
}

/// Writes a train file of `n_train` and a test file of `n_test` images into
/// a fresh temporary directory.
fn write_fixture(name: &str, n_train: usize, n_test: usize) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("adbn_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    for (images, labels, n) in [(TRAIN_IMAGES, TRAIN_LABELS, n_train), (TEST_IMAGES, TEST_LABELS, n_test)] {
        let (x, y) = digit_images(n, &mut rng);
        let (ib, lb) = encode_idx_pair(&x, (SIDE, SIDE), &y);
        fs::write(dir.join(images), ib).unwrap();
        fs::write(dir.join(labels), lb).unwrap();
    }
    dir
}

fn quick_params(epochs: usize) -> TrainParam {
    TrainParam { epochs, batch_size: 10, ..TrainParam::default() }
}

#[test]
fn opens_idx_directory_and_splits_validation() {
    let dir = write_fixture("open", 120, 40);
    let source = DigitSource::open_with_validation(&dir, 20).unwrap();
    assert_eq!(source.data.train.len(), 100);
    assert_eq!(source.data.valid.len(), 20);
    assert_eq!(source.data.test.len(), 40);
    assert_eq!(source.image_size(), 16);
    // Validation rows are the tail of the training file.
    assert_eq!(source.data.valid.classes()[0], 100 % 10);

    assert!(DigitSource::open_with_validation(&dir, 500).is_err());
    assert!(DigitSource::open(dir.join("missing")).is_err());
}

#[test]
fn rbm_training_lowers_reconstruction_cost() {
    let dir = write_fixture("train", 220, 20);
    let source = DigitSource::open_with_validation(&dir, 20).unwrap();
    let opts = LoadOptions::default().with_preprocess(Preprocess { threshold: Some(0.5), ..Preprocess::default() });
    let data = load_digits(&source, &opts).unwrap();

    let mut rbm = Rbm::new(RbmConfig::new(16, 16, quick_params(15))).unwrap();
    let history = rbm.train(&data.train.x, None).unwrap();
    assert_eq!(history.len(), 15);
    assert!(history.last().unwrap().cost < history[0].cost);

    let recon = rbm.reconstruct(&data.test.x, 1).unwrap();
    assert_eq!(recon.shape(), data.test.x.shape());
    assert!(recon.data.iter().all(|&p| (0.0..=1.0).contains(&p)));
}

#[test]
fn label_association_reports_rates() {
    let dir = write_fixture("label", 120, 40);
    let source = DigitSource::open_with_validation(&dir, 20).unwrap();
    let log_path = dir.join("results.jsonl");
    let _ = fs::remove_file(&log_path);

    let cfg = LabelAssociationConfig {
        data: LoadOptions::sized([100, 0, 40])
            .with_preprocess(Preprocess { label_vector: true, ..Preprocess::default() }),
        rbm: RbmConfig::new(0, 24, quick_params(5)),
        results_log: Some(log_path.clone()),
        ..LabelAssociationConfig::default()
    };
    let report = label_association(&source, &cfg).unwrap();
    assert!((0.0..=1.0).contains(&report.classification_rate));
    assert!(report.reconstruction_error >= 0.0);
    assert!(report.model.contains("_v210_"));

    let entries = ResultsLog::new(&log_path).entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["experiment"], "label_association");
}

#[test]
fn parity_association_runs_every_round() {
    let dir = write_fixture("parity", 120, 40);
    let source = DigitSource::open_with_validation(&dir, 20).unwrap();

    let cfg = ParityAssociationConfig {
        data: LoadOptions::sized([100, 0, 30]),
        rbm: RbmConfig::new(0, 20, quick_params(2)),
        rounds: 2,
        inference_steps: 3,
        results_log: None,
    };
    let report = parity_association(&source, &cfg).unwrap();
    assert_eq!(report.rounds.len(), 2);
    for round in &report.rounds {
        assert!((0.0..=1.0).contains(&round.inference_error));
        assert!((0.0..=1.0).contains(&round.free_energy_error));
        assert!(round.final_cost.is_some());
    }
    assert!(report.model.starts_with("RBM_v32_h20"));
}

fn tiny_adbn() -> AdbnConfig {
    let layer = RbmConfig::new(0, 0, quick_params(3));
    AdbnConfig {
        left: DbnConfig::new(vec![784, 12], vec![layer.clone()]),
        right: DbnConfig::new(vec![784, 8], vec![layer]),
        n_association: 10,
        top: RbmConfig { train_params: quick_params(2), ..RbmConfig::default() },
        reuse_dbn: false,
    }
}

#[test]
fn parity_adbn_recalls_parity_images() {
    let dir = write_fixture("adbn", 120, 40);
    let source = DigitSource::open_with_validation(&dir, 20).unwrap();

    let cfg = ParityAdbnConfig {
        data: LoadOptions::sized([80, 0, 30]),
        model: tiny_adbn(),
        rounds: 2,
        associate_steps: 2,
        recall_steps: 1,
        reconstruction_steps: 2,
        results_log: None,
    };
    let report = parity_adbn(&source, &cfg).unwrap();
    assert_eq!(report.rounds.len(), 2);
    assert!(report.left_reconstruction_error.is_some());
    assert!(report.right_reconstruction_error.is_some());
    assert!(report.rounds.iter().all(|r| (0.0..=1.0).contains(&r.recall_error)));
    // The configured 784-wide inputs were resized to the 4x4 images.
    assert!(report.model.starts_with("ADBN_DBN_16_12"));
}

#[test]
fn experiment_configs_load_from_json() {
    let dir = write_fixture("json", 20, 10);
    let path = dir.join("adbn.json");
    let cfg = ParityAdbnConfig { rounds: 3, model: tiny_adbn(), ..ParityAdbnConfig::default() };
    save_json(&cfg, path.to_str().unwrap()).unwrap();
    let loaded: ParityAdbnConfig = load_json(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.rounds, 3);
    assert_eq!(loaded.model.left.topology, vec![784, 12]);
    assert_eq!(loaded.model.n_association, 10);
    assert_eq!(loaded.data, cfg.data);

    // Missing fields fall back to defaults.
    fs::write(&path, r#"{ "rounds": 7 }"#).unwrap();
    let partial: ParityAssociationConfig = load_json(path.to_str().unwrap()).unwrap();
    assert_eq!(partial.rounds, 7);
    assert_eq!(partial.inference_steps, ParityAssociationConfig::default().inference_steps);
}
