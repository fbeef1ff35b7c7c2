use std::fmt;

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::config::{load_json, save_json};
use crate::dbn::dbn::{Dbn, DbnConfig};
use crate::error::{RbmError, Result};
use crate::math::matrix::Matrix;
use crate::rbm::config::{RbmConfig, TrainParam};
use crate::rbm::rbm::Rbm;
use crate::train::EpochStats;

/// Two modality-specific DBNs joined by an associative top RBM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbnConfig {
    pub left: DbnConfig,
    pub right: DbnConfig,
    /// Hidden units of the top RBM.
    pub n_association: usize,
    /// Training setup of the top RBM; its sizes are derived from the DBNs.
    pub top: RbmConfig,
    /// Encode both modalities with the left DBN.
    pub reuse_dbn: bool,
}

impl Default for AdbnConfig {
    fn default() -> Self {
        let tr = TrainParam {
            learning_rate: 0.1,
            weight_decay: 0.001,
            epochs: 20,
            ..TrainParam::default()
        };
        AdbnConfig {
            left: DbnConfig::default(),
            right: DbnConfig::default(),
            n_association: 100,
            top: RbmConfig { train_params: tr, ..RbmConfig::default() },
            reuse_dbn: false,
        }
    }
}

impl AdbnConfig {
    pub fn save_json(&self, path: &str) -> Result<()> {
        save_json(self, path)
    }

    pub fn load_json(path: &str) -> Result<AdbnConfig> {
        load_json(path)
    }
}

/// Which parts of the model a call to `AssociativeDbn::train` trains.
///
/// `left` / `right` are per-layer flags as taken by `Dbn::train`; an empty
/// list trains every layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdbnTrainPlan {
    pub left: Vec<bool>,
    pub right: Vec<bool>,
    pub top: bool,
}

impl AdbnTrainPlan {
    pub fn all() -> Self {
        AdbnTrainPlan { left: Vec::new(), right: Vec::new(), top: true }
    }

    /// Leave both DBNs alone and train only the association layer.
    pub fn top_only(left_layers: usize, right_layers: usize) -> Self {
        AdbnTrainPlan {
            left: vec![false; left_layers],
            right: vec![false; right_layers],
            top: true,
        }
    }
}

/// Epoch statistics of one `AssociativeDbn::train` call.
#[derive(Debug, Clone, Default)]
pub struct AdbnTrainHistory {
    pub left: Vec<Vec<EpochStats>>,
    pub right: Vec<Vec<EpochStats>>,
    pub top: Vec<EpochStats>,
}

#[derive(Debug, Clone)]
pub struct AssociativeDbn {
    config: AdbnConfig,
    left: Dbn,
    /// `None` when the left DBN is reused for the right modality.
    right: Option<Dbn>,
    top: Rbm,
}

impl AssociativeDbn {
    pub fn new(config: AdbnConfig) -> Result<AssociativeDbn> {
        if config.n_association == 0 {
            return Err(RbmError::config("n_association", "must be at least 1"));
        }
        let left = Dbn::new(config.left.clone())?;
        let right = if config.reuse_dbn {
            None
        } else {
            Some(Dbn::new(config.right.clone())?)
        };
        let right_top = right.as_ref().unwrap_or(&left).output_size();

        let mut top_config = config.top.clone();
        top_config.v_n = left.output_size() + right_top;
        top_config.v2_n = 0;
        top_config.h_n = config.n_association;
        let top = Rbm::new(top_config)?;

        Ok(AssociativeDbn { config, left, right, top })
    }

    pub fn config(&self) -> &AdbnConfig {
        &self.config
    }

    pub fn dbn_left(&self) -> &Dbn {
        &self.left
    }

    pub fn dbn_right(&self) -> &Dbn {
        self.right.as_ref().unwrap_or(&self.left)
    }

    pub fn dbn_left_mut(&mut self) -> &mut Dbn {
        &mut self.left
    }

    pub fn dbn_right_mut(&mut self) -> &mut Dbn {
        match self.right {
            Some(ref mut right) => right,
            None => &mut self.left,
        }
    }

    pub fn association_layer(&self) -> &Rbm {
        &self.top
    }

    /// Trains the DBNs per `plan`, then the association layer on the joined
    /// top-level representations of `x` and `y`.
    pub fn train(&mut self, x: &Matrix, y: &Matrix, plan: &AdbnTrainPlan) -> Result<AdbnTrainHistory> {
        if x.rows != y.rows {
            return Err(RbmError::dimension(x.rows, y.rows, "AssociativeDbn::train (row count)"));
        }
        let mut history = AdbnTrainHistory::default();

        match self.right {
            Some(ref mut right) => {
                info!(dbn = %self.left, "training left DBN");
                history.left = self.left.train(x, &plan.left)?;
                info!(dbn = %right, "training right DBN");
                history.right = right.train(y, &plan.right)?;
            }
            None => {
                info!(dbn = %self.left, "training shared DBN on both modalities");
                history.left = self.left.train(&x.vconcat(y), &plan.left)?;
            }
        }

        if plan.top {
            let joint = self.joint_representation(x, y)?;
            info!(model = %self.top, "training association layer");
            history.top = self.top.train(&joint, None)?;
        }
        Ok(history)
    }

    fn joint_representation(&self, x: &Matrix, y: &Matrix) -> Result<Matrix> {
        let left = self.dbn_left();
        let right = self.dbn_right();
        let left_in = left.bottom_up_pass(x, 0, left.n_layers())?;
        let right_in = right.bottom_up_pass(y, 0, right.n_layers())?;
        Ok(left_in.hconcat(&right_in))
    }

    /// Generates the right modality from `x`.
    ///
    /// `x` goes up the left DBN; the right half of the association layer's
    /// visible units starts blank and is filled in by `associate_steps`
    /// mean-field steps; `recall_steps` further Gibbs steps settle it in the
    /// right DBN's top RBM before it is passed down to an image.
    pub fn recall(&mut self, x: &Matrix, associate_steps: usize, recall_steps: usize) -> Result<Matrix> {
        let left_in = {
            let left = self.dbn_left();
            left.bottom_up_pass(x, 0, left.n_layers())?
        };
        let right_width = self.dbn_right().output_size();
        let blank = Matrix::zeros(x.rows, right_width);
        let mut right_top = self
            .top
            .mean_field_inference(&left_in, &blank, associate_steps, false)?;

        let right = self.dbn_right_mut();
        if recall_steps > 0 {
            right_top = right.settle_top(&right_top, recall_steps)?;
        }
        right.top_down_pass(&right_top, 0, right.n_layers())
    }

    /// Mean activation of every association unit over a batch of pairs.
    pub fn hidden_activity(&self, x: &Matrix, y: &Matrix) -> Result<Matrix> {
        let joint = self.joint_representation(x, y)?;
        let (_, p_h) = self.top.prop_up(&joint, None)?;
        Ok(p_h.mean_rows())
    }
}

impl fmt::Display for AssociativeDbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ADBN_{}__{}__{}", self.left, self.dbn_right(), self.top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny(reuse: bool) -> AssociativeDbn {
        let tr = TrainParam { epochs: 1, batch_size: 5, ..TrainParam::default() };
        let layer = RbmConfig::new(0, 0, tr.clone());
        let config = AdbnConfig {
            left: DbnConfig::new(vec![9, 6], vec![layer.clone()]),
            right: DbnConfig::new(vec![9, 4], vec![layer]),
            n_association: 5,
            top: RbmConfig::new(0, 0, tr),
            reuse_dbn: reuse,
        };
        AssociativeDbn::new(config).unwrap()
    }

    #[test]
    fn top_width_joins_both_dbns() {
        assert_eq!(tiny(false).association_layer().n_visible(), 10);
        assert_eq!(tiny(true).association_layer().n_visible(), 12);
    }

    #[test]
    fn recall_produces_right_images() {
        let mut adbn = tiny(false);
        let x = Matrix::filled(10, 9, 1.0);
        let y = Matrix::zeros(10, 9);
        let history = adbn.train(&x, &y, &AdbnTrainPlan::all()).unwrap();
        assert_eq!(history.top.len(), 1);
        let out = adbn.recall(&x, 3, 2).unwrap();
        assert_eq!(out.shape(), (10, 9));
        assert!(out.data.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert_eq!(adbn.hidden_activity(&x, &y).unwrap().shape(), (1, 5));
    }

    #[test]
    fn recall_steps_sample_the_right_dbn() {
        let mut adbn = tiny(false);
        let x = Matrix::filled(10, 9, 1.0);
        let y = Matrix::zeros(10, 9);
        adbn.train(&x, &y, &AdbnTrainPlan::all()).unwrap();

        // Mean-field association alone is deterministic.
        assert_eq!(adbn.recall(&x, 3, 0).unwrap(), adbn.recall(&x, 3, 0).unwrap());
        // Gibbs settling draws fresh samples on every call.
        assert_ne!(adbn.recall(&x, 3, 5).unwrap(), adbn.recall(&x, 3, 5).unwrap());
    }

    #[test]
    fn rejects_unpaired_inputs() {
        let mut adbn = tiny(true);
        let err = adbn.train(&Matrix::zeros(4, 9), &Matrix::zeros(3, 9), &AdbnTrainPlan::all());
        assert!(err.is_err());
    }
}
