use std::path::PathBuf;

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::data::loader::{load_digits, DigitSource, LoadOptions, Preprocess, N_DIGITS};
use crate::error::Result;
use crate::eval::metrics::{classification_rate, reconstruction_error};
use crate::experiment::results_log::ResultsLog;
use crate::rbm::config::{MomentumType, RbmConfig, TrainParam};
use crate::rbm::rbm::Rbm;

pub const LABEL_ASSOCIATION: &str = "label_association";

/// An associative RBM over (image, one-hot label) pairs, used as a
/// generative classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelAssociationConfig {
    pub data: LoadOptions,
    /// Visible sizes are taken from the data.
    pub rbm: RbmConfig,
    /// Gibbs steps when reconstructing test images.
    pub reconstruction_steps: usize,
    /// Steps when inferring labels from images.
    pub association_steps: usize,
    pub results_log: Option<PathBuf>,
}

impl Default for LabelAssociationConfig {
    fn default() -> Self {
        let tr = TrainParam {
            learning_rate: 0.1,
            momentum_type: MomentumType::Classical,
            momentum: 0.5,
            weight_decay: 0.001,
            sparsity_constraint: true,
            sparsity_target: 0.01,
            sparsity_cost: 0.5,
            sparsity_decay: 0.9,
            epochs: 20,
            ..TrainParam::default()
        };
        let data = LoadOptions::sized([500, 100, 100])
            .with_preprocess(Preprocess { label_vector: true, ..Preprocess::default() });
        LabelAssociationConfig {
            data,
            rbm: RbmConfig::new(784, 500, tr),
            reconstruction_steps: 10,
            association_steps: 1,
            results_log: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAssociationReport {
    pub model: String,
    pub final_cost: Option<f64>,
    pub reconstruction_error: f64,
    pub classification_rate: f64,
}

pub fn label_association(source: &DigitSource, cfg: &LabelAssociationConfig) -> Result<LabelAssociationReport> {
    let data = load_digits(source, &cfg.data)?;
    let train_y = data.train.y.to_matrix(N_DIGITS)?;

    let mut rbm_config = cfg.rbm.clone();
    rbm_config.v_n = data.train.x.cols;
    rbm_config.v2_n = train_y.cols;
    let mut rbm = Rbm::new(rbm_config)?;

    info!(model = %rbm, "training associative RBM on image/label pairs");
    let history = rbm.train(&data.train.x, Some(&train_y))?;

    let recon = rbm.reconstruct(&data.test.x, cfg.reconstruction_steps)?;
    let recon_error = reconstruction_error(&recon, &data.test.x)?;

    let p_y = rbm.reconstruct_association(&data.test.x, None, cfg.association_steps)?;
    let rate = classification_rate(&p_y, &data.test.classes())?;
    info!(rate, recon_error, "classification rate");

    let report = LabelAssociationReport {
        model: rbm.to_string(),
        final_cost: history.last().map(|s| s.cost),
        reconstruction_error: recon_error,
        classification_rate: rate,
    };
    if let Some(ref path) = cfg.results_log {
        ResultsLog::new(path).append(LABEL_ASSOCIATION, &report)?;
    }
    Ok(report)
}
