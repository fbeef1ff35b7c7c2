use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::data::loader::{load_digits, sample_image, DigitSource, LoadOptions, Preprocess};
use crate::error::Result;
use crate::eval::classifier::SimpleClassifier;
use crate::experiment::results_log::ResultsLog;
use crate::math::matrix::Matrix;
use crate::rbm::config::{MomentumType, RbmConfig, TrainParam};
use crate::rbm::rbm::Rbm;

pub const PARITY_ASSOCIATION: &str = "parity_association";

/// Hidden layer size from the information content of the labels:
/// `min(1000, -log2(1 / n_classes) * n_samples / n_classes)`.
pub fn hidden_units_for(n_samples: usize, n_classes: usize) -> usize {
    let bits = (n_classes as f64).log2();
    ((bits * n_samples as f64 / n_classes as f64) as usize).clamp(1, 1000)
}

/// Images paired with a picture of their parity digit.
///
/// Each image of an even digit is joined with a random image of a `0`, each
/// odd one with a random `1`.
#[derive(Debug, Clone)]
pub struct ParityData {
    pub train_x: Matrix,
    pub train_parity_x: Matrix,
    pub test_x: Matrix,
    pub test_parity: Vec<usize>,
    pub test_parity_x: Matrix,
    /// `test_x.rows` images of `1`s and `0`s for free-energy comparisons.
    pub ones: Matrix,
    pub zeros: Matrix,
}

impl ParityData {
    /// `opts.preprocess.binary_label` is forced on.
    pub fn load(source: &DigitSource, opts: &LoadOptions) -> Result<ParityData> {
        let mut opts = opts.clone();
        opts.preprocess.binary_label = true;
        opts.preprocess.label_vector = false;
        let data = load_digits(source, &opts)?;

        let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(1));
        let train_parity_x = sample_image(&data.train.classes(), &source.data.train, &mut rng)?;
        let test_parity = data.test.classes();
        let test_parity_x = sample_image(&test_parity, &source.data.train, &mut rng)?;

        let image_opts = |digit: usize| LoadOptions {
            digits: Some(vec![digit]),
            n: Some([data.test.len(), 0, 0]),
            preprocess: Preprocess {
                scale: opts.preprocess.scale,
                threshold: opts.preprocess.threshold,
                ..Preprocess::default()
            },
            seed: opts.seed.wrapping_add(2 + digit as u64),
        };
        let ones = load_digits(source, &image_opts(1))?.train.x;
        let zeros = load_digits(source, &image_opts(0))?.train.x;

        Ok(ParityData {
            train_x: data.train.x,
            train_parity_x,
            test_x: data.test.x,
            test_parity,
            test_parity_x,
            ones,
            zeros,
        })
    }

    pub fn image_size(&self) -> usize {
        self.train_x.cols
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityAssociationConfig {
    pub data: LoadOptions,
    /// `v_n` is set to twice the image size.
    pub rbm: RbmConfig,
    /// Train / evaluate cycles; every round trains `rbm.train_params.epochs`
    /// further epochs.
    pub rounds: usize,
    pub inference_steps: usize,
    pub results_log: Option<PathBuf>,
}

impl Default for ParityAssociationConfig {
    fn default() -> Self {
        let tr = TrainParam {
            learning_rate: 0.001,
            momentum_type: MomentumType::Nesterov,
            momentum: 0.5,
            weight_decay: 0.0001,
            sparsity_constraint: true,
            sparsity_target: 0.1,
            sparsity_decay: 0.9,
            sparsity_cost: 0.1,
            dropout: true,
            dropout_rate: 0.5,
            epochs: 1,
            ..TrainParam::default()
        };
        let train_n = 1000;
        ParityAssociationConfig {
            data: LoadOptions::sized([train_n, 100, 1000]),
            rbm: RbmConfig::new(784 * 2, hidden_units_for(train_n, 10), tr),
            rounds: 5,
            inference_steps: 10,
            results_log: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityRound {
    pub round: usize,
    pub final_cost: Option<f64>,
    /// Parity error of the inferred images.
    pub inference_error: f64,
    /// Parity error when picking whichever of `[x, one]` / `[x, zero]` has
    /// the lower free energy.
    pub free_energy_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub model: String,
    pub rounds: Vec<ParityRound>,
}

impl ParityReport {
    pub fn errors(&self) -> Vec<f64> {
        self.rounds.iter().map(|r| r.inference_error).collect()
    }
}

/// Fraction of positions where the two label lists disagree.
pub(crate) fn mismatch_rate(predicted: &[usize], expected: &[usize]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let wrong = predicted.iter().zip(expected).filter(|(p, e)| p != e).count();
    wrong as f64 / expected.len() as f64
}

pub fn parity_association(source: &DigitSource, cfg: &ParityAssociationConfig) -> Result<ParityReport> {
    let data = ParityData::load(source, &cfg.data)?;
    let joint = data.train_x.hconcat(&data.train_parity_x);

    let mut rbm_config = cfg.rbm.clone();
    rbm_config.v_n = joint.cols;
    rbm_config.v2_n = 0;
    let mut rbm = Rbm::new(rbm_config)?;
    info!(model = %rbm, hidden = rbm.n_hidden(), "parity association");

    let clf = SimpleClassifier::fitted(&data.test_x, &data.test_parity)?;
    let with_one = data.test_x.hconcat(&data.ones);
    let with_zero = data.test_x.hconcat(&data.zeros);
    let blank = Matrix::zeros(data.test_x.rows, data.image_size());

    let mut rounds = Vec::with_capacity(cfg.rounds);
    for round in 0..cfg.rounds {
        let history = rbm.train(&joint, None)?;

        let inferred = rbm.mean_field_inference(&data.test_x, &blank, cfg.inference_steps, false)?;
        let inference_error = mismatch_rate(&clf.classify(&inferred)?, &data.test_parity);

        let e1 = rbm.free_energy(&with_one, None)?;
        let e0 = rbm.free_energy(&with_zero, None)?;
        let by_energy: Vec<usize> = e1.iter().zip(&e0).map(|(a, b)| usize::from(a < b)).collect();
        let free_energy_error = mismatch_rate(&by_energy, &data.test_parity);

        info!(round, inference_error, free_energy_error, "parity round finished");
        rounds.push(ParityRound {
            round,
            final_cost: history.last().map(|s| s.cost),
            inference_error,
            free_energy_error,
        });
    }

    let report = ParityReport { model: rbm.to_string(), rounds };
    if let Some(ref path) = cfg.results_log {
        ResultsLog::new(path).append(PARITY_ASSOCIATION, &report)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_units_follow_label_entropy() {
        assert_eq!(hidden_units_for(1000, 10), 332);
        assert_eq!(hidden_units_for(100_000, 10), 1000);
    }

    #[test]
    fn mismatch_counts_disagreements() {
        assert_eq!(mismatch_rate(&[0, 1, 1, 0], &[0, 1, 0, 1]), 0.5);
        assert_eq!(mismatch_rate(&[], &[]), 0.0);
    }
}
