use std::path::PathBuf;

use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::data::loader::{DigitSource, LoadOptions};
use crate::dbn::associative::{AdbnConfig, AdbnTrainPlan, AssociativeDbn};
use crate::dbn::dbn::DbnConfig;
use crate::error::Result;
use crate::eval::classifier::SimpleClassifier;
use crate::eval::metrics::reconstruction_error;
use crate::experiment::parity::ParityData;
use crate::experiment::results_log::ResultsLog;
use crate::rbm::config::{MomentumType, RbmConfig, TrainParam};

pub const PARITY_ADBN: &str = "parity_adbn";

/// The parity task solved by an associative DBN: the left DBN sees the
/// digit, the right one its parity image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityAdbnConfig {
    pub data: LoadOptions,
    /// The input width of both DBNs is replaced by the image size.
    pub model: AdbnConfig,
    /// Rounds of further association-layer training.
    pub rounds: usize,
    pub associate_steps: usize,
    pub recall_steps: usize,
    /// Gibbs steps for the per-DBN reconstruction check after round 0.
    pub reconstruction_steps: usize,
    pub results_log: Option<PathBuf>,
}

impl Default for ParityAdbnConfig {
    fn default() -> Self {
        let sparse = TrainParam {
            learning_rate: 0.001,
            momentum_type: MomentumType::Nesterov,
            momentum: 0.9,
            weight_decay: 0.0001,
            sparsity_constraint: true,
            sparsity_target: 0.1,
            sparsity_decay: 0.9,
            sparsity_cost: 0.1,
            dropout: true,
            dropout_rate: 0.8,
            epochs: 100,
            ..TrainParam::default()
        };
        let right_tr = TrainParam { momentum: 0.5, dropout_rate: 0.5, epochs: 10, ..sparse.clone() };
        let top_tr = TrainParam {
            learning_rate: 0.00001,
            momentum: 0.5,
            dropout: false,
            dropout_rate: 0.5,
            batch_size: 10,
            ..sparse.clone()
        };

        let h_n = 300;
        let model = AdbnConfig {
            left: DbnConfig::new(vec![784, h_n], vec![RbmConfig::new(784, h_n, sparse)]),
            right: DbnConfig::new(vec![784, h_n], vec![RbmConfig::new(784, h_n, right_tr)]),
            n_association: 300,
            top: RbmConfig { train_params: top_tr, ..RbmConfig::default() },
            reuse_dbn: false,
        };
        ParityAdbnConfig {
            data: LoadOptions::sized([1000, 100, 1000]),
            model,
            rounds: 10,
            associate_steps: 5,
            recall_steps: 0,
            reconstruction_steps: 10,
            results_log: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdbnRound {
    pub round: usize,
    pub final_cost: Option<f64>,
    /// Parity error of the recalled images.
    pub recall_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdbnReport {
    pub model: String,
    pub left_reconstruction_error: Option<f64>,
    pub right_reconstruction_error: Option<f64>,
    pub rounds: Vec<AdbnRound>,
}

pub fn parity_adbn(source: &DigitSource, cfg: &ParityAdbnConfig) -> Result<AdbnReport> {
    let data = ParityData::load(source, &cfg.data)?;

    let mut model_config = cfg.model.clone();
    for dbn in [&mut model_config.left, &mut model_config.right] {
        if let Some(input) = dbn.topology.first_mut() {
            if *input != data.image_size() {
                warn!(configured = *input, actual = data.image_size(), "resizing DBN input layer");
                *input = data.image_size();
            }
        }
    }
    let mut adbn = AssociativeDbn::new(model_config)?;
    info!(model = %adbn, "parity association with an associative DBN");

    // Unsupervised pre-training of both DBNs first.
    let pretrain = AdbnTrainPlan { top: false, ..AdbnTrainPlan::all() };
    adbn.train(&data.train_x, &data.train_parity_x, &pretrain)?;

    let clf = SimpleClassifier::fitted(&data.test_x, &data.test_parity)?;
    let top_only = AdbnTrainPlan::top_only(adbn.dbn_left().n_layers(), adbn.dbn_right().n_layers());

    let mut report = AdbnReport {
        model: adbn.to_string(),
        left_reconstruction_error: None,
        right_reconstruction_error: None,
        rounds: Vec::with_capacity(cfg.rounds),
    };
    for round in 0..cfg.rounds {
        let history = adbn.train(&data.train_x, &data.train_parity_x, &top_only)?;

        if round == 0 {
            let left = adbn.dbn_left_mut().reconstruct(&data.train_x, cfg.reconstruction_steps)?;
            report.left_reconstruction_error = Some(reconstruction_error(&left, &data.train_x)?);
            let right = adbn
                .dbn_right_mut()
                .reconstruct(&data.train_parity_x, cfg.reconstruction_steps)?;
            report.right_reconstruction_error = Some(reconstruction_error(&right, &data.train_parity_x)?);
        }

        let recalled = adbn.recall(&data.test_x, cfg.associate_steps, cfg.recall_steps)?;
        let recall_error = clf.error_rate(&recalled, &data.test_parity)?;
        info!(round, recall_error, "ADBN round finished");

        report.rounds.push(AdbnRound {
            round,
            final_cost: history.top.last().map(|s| s.cost),
            recall_error,
        });
    }

    if let Some(ref path) = cfg.results_log {
        ResultsLog::new(path).append(PARITY_ADBN, &report)?;
    }
    Ok(report)
}
