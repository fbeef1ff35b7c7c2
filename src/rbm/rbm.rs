use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{RbmError, Result};
use crate::math::matrix::Matrix;
use crate::math::sampling::softplus;
use crate::rbm::config::RbmConfig;
use crate::train::{train_loop, EpochStats, TrainMonitor};
use crate::units::UnitType;

/// Standard deviation of the initial weights (Hinton's practical guide).
const INIT_STD: f64 = 0.01;

/// Pre-activation, mean and sampled state of one layer for a batch.
#[derive(Debug, Clone)]
pub struct LayerSample {
    pub pre: Matrix,
    pub mean: Matrix,
    pub state: Matrix,
}

/// Visible-side sample; `v2` is present only for associative RBMs.
#[derive(Debug, Clone)]
pub struct VisibleSample {
    pub v: LayerSample,
    pub v2: Option<LayerSample>,
}

/// A Restricted Boltzmann Machine, optionally with a second visible group.
///
/// Weights are stored as (visible, hidden): `w` is `v_n × h_n` and `u` is
/// `v2_n × h_n`. Biases are 1×n rows.
#[derive(Debug, Clone)]
pub struct Rbm {
    pub(crate) config: RbmConfig,
    pub w: Matrix,
    pub u: Matrix,
    pub v_bias: Matrix,
    pub v2_bias: Matrix,
    pub h_bias: Matrix,

    pub(crate) w_vel: Matrix,
    pub(crate) u_vel: Matrix,
    pub(crate) v_bias_vel: Matrix,
    pub(crate) v2_bias_vel: Matrix,
    pub(crate) h_bias_vel: Matrix,

    /// Hidden state of the persistent chain (PCD only).
    pub(crate) chain: Option<Matrix>,
    /// Running estimate of the mean hidden activation (sparsity).
    pub(crate) activity: Option<Matrix>,
    /// Set once the model has been trained with dropout.
    pub(crate) trained_with_dropout: bool,

    pub(crate) rng: StdRng,
}

impl Rbm {
    pub fn new(config: RbmConfig) -> Result<Rbm> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let (v_n, v2_n, h_n) = (config.v_n, config.v2_n, config.h_n);

        let w = Matrix::gaussian(v_n, h_n, INIT_STD, &mut rng);
        let u = Matrix::gaussian(v2_n, h_n, INIT_STD, &mut rng);

        Ok(Rbm {
            w,
            u,
            v_bias: Matrix::zeros(1, v_n),
            v2_bias: Matrix::zeros(1, v2_n),
            h_bias: Matrix::zeros(1, h_n),
            w_vel: Matrix::zeros(v_n, h_n),
            u_vel: Matrix::zeros(v2_n, h_n),
            v_bias_vel: Matrix::zeros(1, v_n),
            v2_bias_vel: Matrix::zeros(1, v2_n),
            h_bias_vel: Matrix::zeros(1, h_n),
            chain: None,
            activity: None,
            trained_with_dropout: false,
            rng,
            config,
        })
    }

    pub fn config(&self) -> &RbmConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RbmConfig {
        &mut self.config
    }

    pub fn n_visible(&self) -> usize {
        self.config.v_n
    }

    pub fn n_visible2(&self) -> usize {
        self.config.v2_n
    }

    pub fn n_hidden(&self) -> usize {
        self.config.h_n
    }

    pub fn is_associative(&self) -> bool {
        self.config.is_associative()
    }

    /// Reseeds the model's random source.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Weight scale used outside of training. Dropout trains a thinned
    /// network, so the full network's weights are scaled by the retain rate.
    pub(crate) fn inference_scale(&self) -> f64 {
        if self.trained_with_dropout {
            self.config.train_params.dropout_rate
        } else {
            1.0
        }
    }

    pub(crate) fn check_visible(&self, v: &Matrix, v2: Option<&Matrix>, context: &str) -> Result<()> {
        if v.cols != self.config.v_n {
            return Err(RbmError::dimension(self.config.v_n, v.cols, context));
        }
        match v2 {
            Some(v2) => {
                if !self.is_associative() {
                    return Err(RbmError::dimension(0, v2.cols, format!("{} (second visible group)", context)));
                }
                if v2.cols != self.config.v2_n {
                    return Err(RbmError::dimension(self.config.v2_n, v2.cols, context));
                }
                if v2.rows != v.rows {
                    return Err(RbmError::dimension(v.rows, v2.rows, format!("{} (row count)", context)));
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Hidden pre-activations with the given weight scale. `v2` is ignored
    /// for non-associative models.
    pub(crate) fn hidden_pre(&self, v: &Matrix, v2: Option<&Matrix>, scale: f64) -> Matrix {
        let mut pre = v.dot(&self.w);
        if let Some(v2) = v2 {
            if self.is_associative() {
                pre = &pre + &v2.dot(&self.u);
            }
        }
        if scale != 1.0 {
            pre.map_inplace(|x| x * scale);
        }
        pre.add_row(&self.h_bias)
    }

    /// Hidden `(pre, mean)` given the visible layer(s).
    pub fn prop_up(&self, v: &Matrix, v2: Option<&Matrix>) -> Result<(Matrix, Matrix)> {
        self.check_visible(v, v2, "prop_up")?;
        let pre = self.hidden_pre(v, v2, self.inference_scale());
        let mean = self.config.hidden_unit.activate(&pre);
        Ok((pre, mean))
    }

    pub(crate) fn visible_given(&self, h: &Matrix, scale: f64) -> (Matrix, Matrix) {
        let mut pre = h.dot_t(&self.w);
        if scale != 1.0 {
            pre.map_inplace(|x| x * scale);
        }
        let pre = pre.add_row(&self.v_bias);
        let mean = self.config.visible_unit.activate(&pre);
        (pre, mean)
    }

    pub(crate) fn visible2_given(&self, h: &Matrix, scale: f64) -> (Matrix, Matrix) {
        let mut pre = h.dot_t(&self.u);
        if scale != 1.0 {
            pre.map_inplace(|x| x * scale);
        }
        let pre = pre.add_row(&self.v2_bias);
        // The associated group is always binary.
        let mean = UnitType::Binary.activate(&pre);
        (pre, mean)
    }

    fn check_hidden(&self, h: &Matrix, context: &str) -> Result<()> {
        if h.cols != self.config.h_n {
            return Err(RbmError::dimension(self.config.h_n, h.cols, context));
        }
        Ok(())
    }

    /// Visible `(pre, mean)` given a hidden configuration.
    pub fn prop_down(&self, h: &Matrix) -> Result<(Matrix, Matrix)> {
        self.check_hidden(h, "prop_down")?;
        Ok(self.visible_given(h, self.inference_scale()))
    }

    /// Second visible group `(pre, mean)` given a hidden configuration.
    pub fn prop_down_assoc(&self, h: &Matrix) -> Result<(Matrix, Matrix)> {
        self.check_hidden(h, "prop_down_assoc")?;
        if !self.is_associative() {
            return Err(RbmError::config("v2_n", "model has no associated visible group"));
        }
        Ok(self.visible2_given(h, self.inference_scale()))
    }

    pub(crate) fn sample_hidden(&mut self, v: &Matrix, v2: Option<&Matrix>, scale: f64) -> LayerSample {
        let pre = self.hidden_pre(v, v2, scale);
        let mean = self.config.hidden_unit.activate(&pre);
        let state = self.config.hidden_unit.sample(&mean, &pre, &mut self.rng);
        LayerSample { pre, mean, state }
    }

    pub(crate) fn sample_visible(&mut self, h: &Matrix, scale: f64) -> VisibleSample {
        let (pre, mean) = self.visible_given(h, scale);
        let state = self.config.visible_unit.sample(&mean, &pre, &mut self.rng);
        let v = LayerSample { pre, mean, state };
        let v2 = if self.is_associative() {
            let (pre, mean) = self.visible2_given(h, scale);
            let state = UnitType::Binary.sample(&mean, &pre, &mut self.rng);
            Some(LayerSample { pre, mean, state })
        } else {
            None
        };
        VisibleSample { v, v2 }
    }

    pub fn sample_h_given_v(&mut self, v: &Matrix, v2: Option<&Matrix>) -> Result<LayerSample> {
        self.check_visible(v, v2, "sample_h_given_v")?;
        let scale = self.inference_scale();
        Ok(self.sample_hidden(v, v2, scale))
    }

    pub fn sample_v_given_h(&mut self, h: &Matrix) -> Result<VisibleSample> {
        self.check_hidden(h, "sample_v_given_h")?;
        let scale = self.inference_scale();
        Ok(self.sample_visible(h, scale))
    }

    /// One step h → v → h starting from a hidden state.
    pub fn gibbs_hvh(&mut self, h: &Matrix) -> Result<(VisibleSample, LayerSample)> {
        let visible = self.sample_v_given_h(h)?;
        let v2 = visible.v2.as_ref().map(|s| s.state.clone());
        let hidden = self.sample_h_given_v(&visible.v.state, v2.as_ref())?;
        Ok((visible, hidden))
    }

    /// One step v → h → v starting from a visible state.
    pub fn gibbs_vhv(&mut self, v: &Matrix, v2: Option<&Matrix>) -> Result<(LayerSample, VisibleSample)> {
        let hidden = self.sample_h_given_v(v, v2)?;
        let visible = self.sample_v_given_h(&hidden.state)?;
        Ok((hidden, visible))
    }

    /// Free energy of every row: `Σ visible terms − Σ_j softplus(pre_j)`.
    pub fn free_energy(&self, v: &Matrix, v2: Option<&Matrix>) -> Result<Vec<f64>> {
        self.check_visible(v, v2, "free_energy")?;
        let pre = self.hidden_pre(v, v2, self.inference_scale());
        let mut energy = self.config.visible_unit.free_energy_term(v, &self.v_bias);
        if let (Some(v2), true) = (v2, self.is_associative()) {
            let extra = UnitType::Binary.free_energy_term(v2, &self.v2_bias);
            for (e, x) in energy.iter_mut().zip(extra) {
                *e += x;
            }
        }
        for (e, row) in energy.iter_mut().zip(pre.rows_iter()) {
            *e -= row.iter().map(|&x| softplus(x)).sum::<f64>();
        }
        Ok(energy)
    }

    /// Trains on `x` (and the associated `x2`) for `train_params.epochs`
    /// epochs. Returns one `EpochStats` per completed epoch.
    pub fn train(&mut self, x: &Matrix, x2: Option<&Matrix>) -> Result<Vec<EpochStats>> {
        self.train_with_monitor(x, x2, &TrainMonitor::new())
    }

    pub fn train_with_monitor(
        &mut self,
        x: &Matrix,
        x2: Option<&Matrix>,
        monitor: &TrainMonitor,
    ) -> Result<Vec<EpochStats>> {
        self.check_visible(x, x2, "train")?;
        if self.is_associative() && x2.is_none() {
            return Err(RbmError::config("x2", "associative RBM needs both visible groups"));
        }
        if x.rows == 0 {
            return Err(RbmError::empty("training data"));
        }
        if self.config.train_params.find_learning_rate {
            self.find_learning_rate(x, x2)?;
        }
        train_loop(self, x, x2, monitor)
    }

    /// Tries 10·lr, lr and lr/10 for one epoch on copies of the model and
    /// keeps the rate with the lowest reconstruction cost.
    fn find_learning_rate(&mut self, x: &Matrix, x2: Option<&Matrix>) -> Result<f64> {
        let base = self.config.train_params.learning_rate;
        let mut best = (base, f64::INFINITY);
        for lr in [base * 10.0, base, base / 10.0] {
            let mut trial = self.clone();
            trial.config.train_params.learning_rate = lr;
            trial.config.train_params.epochs = 1;
            trial.config.train_params.find_learning_rate = false;
            let stats = train_loop(&mut trial, x, x2, &TrainMonitor::new())?;
            let cost = stats.last().map_or(f64::INFINITY, |s| s.cost);
            debug!(lr, cost, "learning rate trial");
            if cost.is_finite() && cost < best.1 {
                best = (lr, cost);
            }
        }
        self.config.train_params.learning_rate = best.0;
        tracing::info!(learning_rate = best.0, "selected learning rate");
        Ok(best.0)
    }

    /// Runs `k` Gibbs steps from the data and returns the visible means of
    /// the last step. Only the image pathway (`w`) takes part; an associated
    /// group is left out of the chain.
    pub fn reconstruct(&mut self, x: &Matrix, k: usize) -> Result<Matrix> {
        self.check_visible(x, None, "reconstruct")?;
        let scale = self.inference_scale();
        let mut v = x.clone();
        let mut mean = x.clone();
        for _ in 0..k.max(1) {
            let h = self.sample_hidden(&v, None, scale);
            let (pre, m) = self.visible_given(&h.state, scale);
            v = self.config.visible_unit.sample(&m, &pre, &mut self.rng);
            mean = m;
        }
        Ok(mean)
    }

    /// Infers the associated group from `x`. `x` stays clamped; `y` starts
    /// at `y0` (zeros if absent) and is replaced by `p(y | h)` each step.
    pub fn reconstruct_association(&mut self, x: &Matrix, y0: Option<&Matrix>, k: usize) -> Result<Matrix> {
        if !self.is_associative() {
            return Err(RbmError::config("v2_n", "model has no associated visible group"));
        }
        let mut y = match y0 {
            Some(y0) => y0.clone(),
            None => Matrix::zeros(x.rows, self.config.v2_n),
        };
        self.check_visible(x, Some(&y), "reconstruct_association")?;
        let scale = self.inference_scale();
        for _ in 0..k.max(1) {
            let h = self.sample_hidden(x, Some(&y), scale);
            let (_, mean) = self.visible2_given(&h.state, scale);
            y = mean;
        }
        Ok(y)
    }

    /// Mean-field completion for a model whose visible layer is `[x, y]`.
    ///
    /// The first `x.cols` visible units are clamped to `x`; the remaining
    /// ones start at `y0` and are updated for `k` steps, using hidden means
    /// (or samples when `sample` is set). Returns the `y` block.
    pub fn mean_field_inference(
        &mut self,
        x: &Matrix,
        y0: &Matrix,
        k: usize,
        sample: bool,
    ) -> Result<Matrix> {
        if x.cols + y0.cols != self.config.v_n {
            return Err(RbmError::dimension(self.config.v_n, x.cols + y0.cols, "mean_field_inference"));
        }
        if x.rows != y0.rows {
            return Err(RbmError::dimension(x.rows, y0.rows, "mean_field_inference (row count)"));
        }
        let scale = self.inference_scale();
        let split = x.cols;
        let mut y = y0.clone();
        for _ in 0..k.max(1) {
            let v = x.hconcat(&y);
            let h = self.sample_hidden(&v, None, scale);
            let h = if sample { h.state } else { h.mean };
            let (_, mean) = self.visible_given(&h, scale);
            let (_, y_new) = mean.split_cols(split);
            y = y_new;
        }
        Ok(y)
    }
}

impl fmt::Display for Rbm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbm::config::TrainParam;

    fn small(v_n: usize, v2_n: usize, h_n: usize) -> Rbm {
        let config = RbmConfig {
            v_n,
            v2_n,
            h_n,
            train_params: TrainParam { epochs: 2, ..TrainParam::default() },
            ..RbmConfig::default()
        };
        Rbm::new(config).unwrap()
    }

    #[test]
    fn shapes_follow_config() {
        let rbm = small(6, 3, 4);
        assert_eq!(rbm.w.shape(), (6, 4));
        assert_eq!(rbm.u.shape(), (3, 4));
        assert_eq!(rbm.h_bias.shape(), (1, 4));
        assert!(rbm.w.data.iter().all(|w| w.abs() < 0.1));
    }

    #[test]
    fn prop_up_rejects_wrong_width() {
        let rbm = small(6, 0, 4);
        let err = rbm.prop_up(&Matrix::zeros(2, 5), None).unwrap_err();
        assert!(matches!(err, RbmError::DimensionMismatch { expected: 6, got: 5, .. }));
    }

    #[test]
    fn free_energy_of_zero_input() {
        let rbm = small(6, 0, 4);
        // With zero visible input and zero biases, F = −h_n · ln 2.
        let f = rbm.free_energy(&Matrix::zeros(1, 6), None).unwrap();
        assert!((f[0] + 4.0 * 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn reconstruction_is_a_probability() {
        let mut rbm = small(6, 0, 4);
        let x = Matrix::from_data(vec![vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]]);
        let r = rbm.reconstruct(&x, 3).unwrap();
        assert_eq!(r.shape(), (1, 6));
        assert!(r.data.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn association_needs_second_group() {
        let mut rbm = small(6, 0, 4);
        assert!(rbm.reconstruct_association(&Matrix::zeros(1, 6), None, 1).is_err());
    }

    #[test]
    fn mean_field_returns_missing_block() {
        let mut rbm = small(6, 0, 4);
        let y = rbm
            .mean_field_inference(&Matrix::zeros(2, 4), &Matrix::zeros(2, 2), 3, false)
            .unwrap();
        assert_eq!(y.shape(), (2, 2));
    }

    fn bars(n: usize) -> Matrix {
        let rows = (0..n)
            .map(|i| if i % 2 == 0 { vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0] } else { vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0] })
            .collect();
        Matrix::from_data(rows)
    }

    #[test]
    fn image_reconstruction_ignores_associated_group() {
        let mut rbm = small(4, 3, 5);
        rbm.u = Matrix::filled(3, 5, 4.0);
        rbm.v2_bias = Matrix::filled(1, 3, 3.0);
        let mut plain = rbm.clone();
        plain.u = Matrix::zeros(3, 5);
        plain.v2_bias = Matrix::zeros(1, 3);

        let x = Matrix::zeros(2, 4);
        assert_eq!(rbm.reconstruct(&x, 3).unwrap(), plain.reconstruct(&x, 3).unwrap());

        // With no image weights the reconstruction is sigmoid(0) everywhere.
        rbm.w = Matrix::zeros(4, 5);
        let r = rbm.reconstruct(&x, 3).unwrap();
        assert!(r.data.iter().all(|&p| p == 0.5));
    }

    #[test]
    fn learning_rate_search_keeps_a_neighbouring_rate() {
        let mut rbm = small(6, 0, 4);
        rbm.config.train_params.batch_size = 5;
        let base = rbm.config.train_params.learning_rate;
        let chosen = rbm.find_learning_rate(&bars(20), None).unwrap();
        assert!([base * 10.0, base, base / 10.0].iter().any(|&lr| (lr - chosen).abs() < 1e-12));
        assert_eq!(rbm.config().train_params.learning_rate, chosen);

        // Training with the search enabled uses the chosen rate throughout.
        let mut rbm = small(6, 0, 4);
        rbm.config.train_params.batch_size = 5;
        rbm.config.train_params.find_learning_rate = true;
        let history = rbm.train(&bars(20), None).unwrap();
        assert_eq!(history.len(), 2);
        let chosen = rbm.config().train_params.learning_rate;
        assert!(history.iter().all(|s| s.learning_rate == chosen));
    }

    #[test]
    fn associated_group_is_a_probability() {
        let mut rbm = small(6, 2, 4);
        rbm.config.train_params.batch_size = 5;
        let x = bars(10);
        let rows = (0..10).map(|i| if i % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] }).collect();
        let y = Matrix::from_data(rows);
        rbm.train(&x, Some(&y)).unwrap();

        let p = rbm.reconstruct_association(&x, None, 3).unwrap();
        assert_eq!(p.shape(), (10, 2));
        assert!(p.data.iter().all(|&q| (0.0..=1.0).contains(&q)));

        let p = rbm.reconstruct_association(&x, Some(&Matrix::filled(10, 2, 0.5)), 1).unwrap();
        assert_eq!(p.shape(), (10, 2));
        assert!(rbm.reconstruct_association(&x, Some(&Matrix::zeros(10, 3)), 1).is_err());
    }

    #[test]
    fn mean_field_keeps_known_block_clamped() {
        let mut rbm = small(6, 0, 4);
        let x = bars(4).split_cols(4).0;
        let y0 = Matrix::filled(4, 2, 0.5);

        // One deterministic step is a full up-down pass over [x, y0].
        let (_, h) = rbm.prop_up(&x.hconcat(&y0), None).unwrap();
        let (_, v) = rbm.prop_down(&h).unwrap();
        let one = rbm.mean_field_inference(&x, &y0, 1, false).unwrap();
        assert_eq!(one, v.split_cols(4).1);

        // Each step restarts from the clamped x, so two steps equal one
        // step applied twice.
        let twice = rbm.mean_field_inference(&x, &one, 1, false).unwrap();
        assert_eq!(rbm.mean_field_inference(&x, &y0, 2, false).unwrap(), twice);

        let sampled = rbm.mean_field_inference(&x, &y0, 1, true).unwrap();
        assert_eq!(sampled.shape(), (4, 2));
        assert_ne!(sampled, one);
    }

    #[test]
    fn display_is_config_key() {
        let rbm = small(6, 0, 4);
        assert_eq!(rbm.to_string(), rbm.config().key());
    }
}
