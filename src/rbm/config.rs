use serde::{Serialize, Deserialize};

use crate::config::{load_json, save_json};
use crate::error::{RbmError, Result};
use crate::units::UnitType;

/// How the negative phase chain is started.
///
/// - `Classical`  — CD-k: each mini-batch restarts the chain at its own data.
/// - `Persistent` — PCD-k: the chain carries over between mini-batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CdType {
    Classical,
    Persistent,
}

/// Velocity update used when applying gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumType {
    Classical,
    Nesterov,
}

/// Optimisation hyperparameters of a single RBM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParam {
    pub learning_rate: f64,
    pub momentum_type: MomentumType,
    pub momentum: f64,
    /// L2 penalty applied to the weights, not the biases.
    pub weight_decay: f64,
    pub sparsity_constraint: bool,
    /// Desired mean activation of each hidden unit.
    pub sparsity_target: f64,
    pub sparsity_cost: f64,
    /// Decay of the running estimate of hidden activity.
    pub sparsity_decay: f64,
    pub dropout: bool,
    /// Probability of *keeping* a hidden unit when `dropout` is on.
    pub dropout_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Try a few learning rates on copies of the model before training.
    pub find_learning_rate: bool,
}

impl Default for TrainParam {
    fn default() -> Self {
        TrainParam {
            learning_rate: 0.1,
            momentum_type: MomentumType::Classical,
            momentum: 0.5,
            weight_decay: 0.0002,
            sparsity_constraint: false,
            sparsity_target: 0.01,
            sparsity_cost: 0.01,
            sparsity_decay: 0.9,
            dropout: false,
            dropout_rate: 0.8,
            batch_size: 10,
            epochs: 5,
            find_learning_rate: false,
        }
    }
}

impl TrainParam {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(RbmError::config("learning_rate", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(RbmError::config("momentum", "must lie in [0, 1)"));
        }
        if self.weight_decay < 0.0 {
            return Err(RbmError::config("weight_decay", "must not be negative"));
        }
        if self.batch_size == 0 {
            return Err(RbmError::config("batch_size", "must be at least 1"));
        }
        if self.dropout && !(self.dropout_rate > 0.0 && self.dropout_rate <= 1.0) {
            return Err(RbmError::config("dropout_rate", "must lie in (0, 1]"));
        }
        if self.sparsity_constraint && !(0.0..=1.0).contains(&self.sparsity_decay) {
            return Err(RbmError::config("sparsity_decay", "must lie in [0, 1]"));
        }
        Ok(())
    }

    fn key(&self) -> String {
        let mut key = format!(
            "lr{}_{}{}_wd{}_bs{}_ep{}",
            self.learning_rate,
            match self.momentum_type {
                MomentumType::Classical => "mom",
                MomentumType::Nesterov => "nag",
            },
            self.momentum,
            self.weight_decay,
            self.batch_size,
            self.epochs,
        );
        if self.sparsity_constraint {
            key.push_str(&format!(
                "_sp{}_{}_{}",
                self.sparsity_target, self.sparsity_cost, self.sparsity_decay
            ));
        }
        if self.dropout {
            key.push_str(&format!("_do{}", self.dropout_rate));
        }
        key
    }
}

/// Architecture and training setup of one RBM.
///
/// `v2_n > 0` adds a second visible group connected to the same hidden layer,
/// turning the model into an associative RBM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbmConfig {
    pub v_n: usize,
    pub v2_n: usize,
    pub h_n: usize,
    pub visible_unit: UnitType,
    pub hidden_unit: UnitType,
    pub cd_type: CdType,
    pub cd_steps: usize,
    pub train_params: TrainParam,
    pub seed: u64,
}

impl Default for RbmConfig {
    fn default() -> Self {
        RbmConfig {
            v_n: 784,
            v2_n: 0,
            h_n: 500,
            visible_unit: UnitType::Binary,
            hidden_unit: UnitType::Binary,
            cd_type: CdType::Classical,
            cd_steps: 1,
            train_params: TrainParam::default(),
            seed: 1234,
        }
    }
}

impl RbmConfig {
    pub fn new(v_n: usize, h_n: usize, train_params: TrainParam) -> Self {
        RbmConfig {
            v_n,
            h_n,
            train_params,
            ..RbmConfig::default()
        }
    }

    pub fn is_associative(&self) -> bool {
        self.v2_n > 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.v_n == 0 {
            return Err(RbmError::config("v_n", "visible layer must not be empty"));
        }
        if self.h_n == 0 {
            return Err(RbmError::config("h_n", "hidden layer must not be empty"));
        }
        if self.cd_steps == 0 {
            return Err(RbmError::config("cd_steps", "must be at least 1"));
        }
        self.train_params.validate()
    }

    /// String identifying this configuration, e.g. in logs and result files.
    pub fn key(&self) -> String {
        let mut key = format!("RBM_v{}", self.v_n);
        if self.is_associative() {
            key.push_str(&format!("_v2{}", self.v2_n));
        }
        key.push_str(&format!(
            "_h{}_{}_{}_cd{}{}_{}",
            self.h_n,
            self.visible_unit.name(),
            self.hidden_unit.name(),
            self.cd_steps,
            match self.cd_type {
                CdType::Classical => "",
                CdType::Persistent => "p",
            },
            self.train_params.key(),
        ));
        key
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        save_json(self, path)
    }

    pub fn load_json(path: &str) -> Result<RbmConfig> {
        load_json(path)
    }
}
