use std::fmt;

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::config::{load_json, save_json};
use crate::error::{RbmError, Result};
use crate::math::matrix::Matrix;
use crate::rbm::config::RbmConfig;
use crate::rbm::rbm::Rbm;
use crate::train::EpochStats;

/// Layer sizes plus the configuration of every RBM in the stack.
///
/// `topology` lists the width of each layer from the visible input upward,
/// so a stack of `topology.len() - 1` RBMs is built. `rbm_configs` is either
/// empty (defaults everywhere) or holds one entry per RBM; its layer sizes are
/// overridden by `topology`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbnConfig {
    pub topology: Vec<usize>,
    pub rbm_configs: Vec<RbmConfig>,
}

impl Default for DbnConfig {
    fn default() -> Self {
        DbnConfig {
            topology: vec![784, 500, 500, 100],
            rbm_configs: Vec::new(),
        }
    }
}

impl DbnConfig {
    pub fn new(topology: Vec<usize>, rbm_configs: Vec<RbmConfig>) -> Self {
        DbnConfig { topology, rbm_configs }
    }

    pub fn n_layers(&self) -> usize {
        self.topology.len().saturating_sub(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.topology.len() < 2 {
            return Err(RbmError::config("topology", "needs at least a visible and a hidden layer"));
        }
        if !self.rbm_configs.is_empty() && self.rbm_configs.len() != self.n_layers() {
            return Err(RbmError::config(
                "rbm_configs",
                format!("expected {} entries, got {}", self.n_layers(), self.rbm_configs.len()),
            ));
        }
        Ok(())
    }

    /// Configuration of RBM `i` with its sizes taken from the topology.
    fn layer_config(&self, i: usize) -> RbmConfig {
        let mut config = self
            .rbm_configs
            .get(i)
            .cloned()
            .unwrap_or_default();
        config.v_n = self.topology[i];
        config.h_n = self.topology[i + 1];
        config.v2_n = 0;
        config.seed = config.seed.wrapping_add(i as u64);
        config
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        save_json(self, path)
    }

    pub fn load_json(path: &str) -> Result<DbnConfig> {
        load_json(path)
    }
}

/// A stack of RBMs trained greedily, one layer at a time.
#[derive(Debug, Clone)]
pub struct Dbn {
    config: DbnConfig,
    pub rbms: Vec<Rbm>,
}

impl Dbn {
    pub fn new(config: DbnConfig) -> Result<Dbn> {
        config.validate()?;
        let rbms = (0..config.n_layers())
            .map(|i| Rbm::new(config.layer_config(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Dbn { config, rbms })
    }

    pub fn config(&self) -> &DbnConfig {
        &self.config
    }

    pub fn n_layers(&self) -> usize {
        self.rbms.len()
    }

    pub fn input_size(&self) -> usize {
        self.config.topology[0]
    }

    /// Width of the topmost hidden layer.
    pub fn output_size(&self) -> usize {
        self.config.topology[self.config.topology.len() - 1]
    }

    pub fn top_rbm_mut(&mut self) -> &mut Rbm {
        let last = self.rbms.len() - 1;
        &mut self.rbms[last]
    }

    /// Greedy layer-wise training. `plan[i]` says whether RBM `i` is trained
    /// (an empty plan trains every layer). Layers that are skipped still pass
    /// their mean activations upward to the next layer.
    pub fn train(&mut self, x: &Matrix, plan: &[bool]) -> Result<Vec<Vec<EpochStats>>> {
        if !plan.is_empty() && plan.len() != self.rbms.len() {
            return Err(RbmError::config(
                "plan",
                format!("expected {} flags, got {}", self.rbms.len(), plan.len()),
            ));
        }
        if x.cols != self.input_size() {
            return Err(RbmError::dimension(self.input_size(), x.cols, "Dbn::train"));
        }

        let mut history = Vec::with_capacity(self.rbms.len());
        let mut layer_input = x.clone();
        let n_layers = self.rbms.len();
        for (i, rbm) in self.rbms.iter_mut().enumerate() {
            let enabled = plan.get(i).copied().unwrap_or(true);
            if enabled {
                info!(layer = i + 1, of = n_layers, model = %rbm, "training DBN layer");
                history.push(rbm.train(&layer_input, None)?);
            } else {
                debug!(layer = i + 1, "skipping DBN layer");
                history.push(Vec::new());
            }
            if i + 1 < n_layers {
                let (_, mean) = rbm.prop_up(&layer_input, None)?;
                layer_input = mean;
            }
        }
        Ok(history)
    }

    /// Mean activations after RBMs `start..end`, starting from `x` as the
    /// input of RBM `start`.
    pub fn bottom_up_pass(&self, x: &Matrix, start: usize, end: usize) -> Result<Matrix> {
        self.check_range(start, end)?;
        let mut activation = x.clone();
        for rbm in &self.rbms[start..end] {
            let (_, mean) = rbm.prop_up(&activation, None)?;
            activation = mean;
        }
        Ok(activation)
    }

    /// Mean visible activations obtained by running `h` down through RBMs
    /// `end-1 ..= start`. `h` is the hidden layer of RBM `end - 1`.
    pub fn top_down_pass(&self, h: &Matrix, start: usize, end: usize) -> Result<Matrix> {
        self.check_range(start, end)?;
        let mut activation = h.clone();
        for rbm in self.rbms[start..end].iter().rev() {
            let (_, mean) = rbm.prop_down(&activation)?;
            activation = mean;
        }
        Ok(activation)
    }

    /// Runs `k` Gibbs steps of the top RBM starting from a top hidden
    /// representation. Intermediate steps use sampled states; the last step
    /// returns hidden means.
    pub fn settle_top(&mut self, h: &Matrix, k: usize) -> Result<Matrix> {
        let top = self.top_rbm_mut();
        let mut h = h.clone();
        for step in 0..k {
            let last = step + 1 == k;
            let visible = top.sample_v_given_h(&h)?;
            let v = if last { visible.v.mean } else { visible.v.state };
            let hidden = top.sample_h_given_v(&v, None)?;
            h = if last { hidden.mean } else { hidden.state };
        }
        Ok(h)
    }

    /// Bottom-up to the top RBM's input, `k` Gibbs steps there, then
    /// top-down back to the visible layer.
    pub fn reconstruct(&mut self, x: &Matrix, k: usize) -> Result<Matrix> {
        let n = self.rbms.len();
        let top_input = self.bottom_up_pass(x, 0, n - 1)?;
        let top_recon = self.top_rbm_mut().reconstruct(&top_input, k)?;
        self.top_down_pass(&top_recon, 0, n - 1)
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start > end || end > self.rbms.len() {
            return Err(RbmError::config(
                "layer range",
                format!("{}..{} is outside 0..{}", start, end, self.rbms.len()),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Dbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<String> = self.config.topology.iter().map(|n| n.to_string()).collect();
        write!(f, "DBN_{}", sizes.join("_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbm::config::TrainParam;

    fn tiny() -> Dbn {
        let tr = TrainParam { epochs: 1, batch_size: 4, ..TrainParam::default() };
        let configs = vec![RbmConfig::new(0, 0, tr.clone()), RbmConfig::new(0, 0, tr)];
        Dbn::new(DbnConfig::new(vec![12, 8, 4], configs)).unwrap()
    }

    #[test]
    fn topology_sets_layer_sizes() {
        let dbn = tiny();
        assert_eq!(dbn.n_layers(), 2);
        assert_eq!(dbn.rbms[0].n_visible(), 12);
        assert_eq!(dbn.rbms[1].n_hidden(), 4);
        assert_eq!(dbn.to_string(), "DBN_12_8_4");
    }

    #[test]
    fn rejects_mismatched_configs() {
        let config = DbnConfig::new(vec![12, 8, 4], vec![RbmConfig::default()]);
        assert!(Dbn::new(config).is_err());
    }

    #[test]
    fn passes_preserve_shapes() {
        let mut dbn = tiny();
        let x = Matrix::filled(3, 12, 1.0);
        let top = dbn.bottom_up_pass(&x, 0, 2).unwrap();
        assert_eq!(top.shape(), (3, 4));
        let back = dbn.top_down_pass(&top, 0, 2).unwrap();
        assert_eq!(back.shape(), (3, 12));
        let r = dbn.reconstruct(&x, 2).unwrap();
        assert!(r.data.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn settling_samples_the_top_rbm() {
        let mut dbn = tiny();
        let h = Matrix::filled(20, 4, 0.5);
        assert_eq!(dbn.settle_top(&h, 0).unwrap(), h);

        let first = dbn.settle_top(&h, 3).unwrap();
        let second = dbn.settle_top(&h, 3).unwrap();
        assert_eq!(first.shape(), (20, 4));
        assert!(first.data.iter().all(|&p| (0.0..=1.0).contains(&p)));
        // The model's random source advances, so repeated settling differs.
        assert_ne!(first, second);
    }

    #[test]
    fn plan_skips_layers() {
        let mut dbn = tiny();
        let x = Matrix::filled(8, 12, 1.0);
        let history = dbn.train(&x, &[false, true]).unwrap();
        assert!(history[0].is_empty());
        assert_eq!(history[1].len(), 1);
    }
}
