use std::time::Instant;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::math::sampling::bernoulli_mask;
use crate::optim::momentum::Momentum;
use crate::rbm::config::CdType;
use crate::rbm::rbm::Rbm;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainMonitor;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `rbm` for `train_params.epochs` epochs of mini-batch contrastive
/// divergence and returns the statistics of every completed epoch.
///
/// Inputs are assumed to be validated by the caller (`Rbm::train`).
///
/// # Early termination
/// The loop breaks early if the `progress_tx` receiver has been dropped or
/// `monitor.stop_flag` is set.
pub fn train_loop(
    rbm: &mut Rbm,
    x: &Matrix,
    x2: Option<&Matrix>,
    monitor: &TrainMonitor,
) -> Result<Vec<EpochStats>> {
    let params = rbm.config.train_params.clone();
    let mut history = Vec::with_capacity(params.epochs);

    if params.dropout {
        rbm.trained_with_dropout = true;
    }

    for epoch in 1..=params.epochs {
        if monitor.should_stop() {
            break;
        }

        let t_start = Instant::now();
        let cost = run_one_epoch(rbm, x, x2);
        let elapsed_ms = t_start.elapsed().as_millis() as u64;

        if !cost.is_finite() {
            warn!(epoch, "reconstruction cost diverged");
        }

        let stats = EpochStats {
            epoch,
            total_epochs: params.epochs,
            cost,
            learning_rate: params.learning_rate,
            elapsed_ms,
        };
        info!(
            model = %rbm,
            epoch,
            total = params.epochs,
            cost,
            elapsed_ms,
            "epoch finished"
        );

        let keep_going = monitor.report(&stats);
        history.push(stats);
        if !keep_going || monitor.should_stop() {
            break;
        }
    }

    Ok(history)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Parameter gradients of one mini-batch, in the ascent direction.
struct Gradients {
    w: Matrix,
    u: Matrix,
    v_bias: Matrix,
    v2_bias: Matrix,
    h_bias: Matrix,
}

/// One full pass over the training data in shuffled mini-batches.
/// Returns the mean reconstruction cost over all samples.
fn run_one_epoch(rbm: &mut Rbm, x: &Matrix, x2: Option<&Matrix>) -> f64 {
    let n = x.rows;
    let batch_size = rbm.config.train_params.batch_size;
    let mut total_cost = 0.0;

    // Shuffle sample order each epoch.
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rbm.rng);

    for batch_start in (0..n).step_by(batch_size) {
        let batch_end = (batch_start + batch_size).min(n);
        let batch_idx = &indices[batch_start..batch_end];

        let v0 = x.select_rows(batch_idx);
        let v2_0 = x2.map(|x2| x2.select_rows(batch_idx));

        let (grads, cost) = contrastive_divergence(rbm, &v0, v2_0.as_ref());
        total_cost += cost * batch_idx.len() as f64;

        apply_gradients(rbm, &grads);
    }

    total_cost / n as f64
}

/// Estimates the log-likelihood gradient of a mini-batch with CD-k or PCD-k.
///
/// Returns the gradients and the mean squared error of the one-step
/// reconstruction of the batch.
fn contrastive_divergence(rbm: &mut Rbm, v0: &Matrix, v2_0: Option<&Matrix>) -> (Gradients, f64) {
    let params = rbm.config.train_params.clone();
    let batch = v0.rows as f64;
    let h_n = rbm.config.h_n;

    // Retain mask over hidden units, shared by both phases of the batch.
    let mask = if params.dropout {
        Some(bernoulli_mask(1, h_n, params.dropout_rate, &mut rbm.rng))
    } else {
        None
    };
    let apply_mask = |m: Matrix| match mask {
        Some(ref mask) => {
            let mut m = m;
            for r in 0..m.rows {
                for (x, &keep) in m.row_mut(r).iter_mut().zip(&mask.data) {
                    *x *= keep;
                }
            }
            m
        }
        None => m,
    };

    // ── Positive phase ──────────────────────────────────────────────────
    let pos = rbm.sample_hidden(v0, v2_0, 1.0);
    let h0_mean = apply_mask(pos.mean);
    let h0_state = apply_mask(pos.state);

    // Monitoring cost: one-step reconstruction of the data.
    let (_, recon) = rbm.visible_given(&h0_state, 1.0);
    let mut cost = (&recon - v0).map(|d| d * d).mean();
    if let Some(v2_0) = v2_0 {
        let (_, recon2) = rbm.visible2_given(&h0_state, 1.0);
        let cost2 = (&recon2 - v2_0).map(|d| d * d).mean();
        cost = (cost * v0.cols as f64 + cost2 * v2_0.cols as f64) / (v0.cols + v2_0.cols) as f64;
    }

    // ── Negative phase ──────────────────────────────────────────────────
    let mut h = match rbm.config.cd_type {
        CdType::Classical => h0_state.clone(),
        // A short remainder batch runs on the leading rows of the chain.
        CdType::Persistent => match rbm.chain {
            Some(ref chain) if chain.rows >= v0.rows => chain.slice_rows(0, v0.rows),
            Some(_) => {
                debug!("persistent chain reset for a batch of {} rows", v0.rows);
                rbm.chain = None;
                h0_state.clone()
            }
            None => h0_state.clone(),
        },
    };
    let steps = rbm.config.cd_steps;
    let mut vk = v0.clone();
    let mut v2k = v2_0.cloned();
    let mut hk_mean = h0_mean.clone();
    for step in 0..steps {
        let last = step + 1 == steps;
        let visible = rbm.sample_visible(&h, 1.0);
        // Means on the final step reduce the variance of the estimate.
        vk = if last { visible.v.mean } else { visible.v.state };
        v2k = visible.v2.map(|s| if last { s.mean } else { s.state });
        let hidden = rbm.sample_hidden(&vk, v2k.as_ref(), 1.0);
        hk_mean = apply_mask(hidden.mean);
        h = apply_mask(hidden.state);
    }
    if rbm.config.cd_type == CdType::Persistent {
        match rbm.chain {
            Some(ref mut chain) if chain.rows > h.rows => {
                chain.data[..h.data.len()].copy_from_slice(&h.data);
            }
            _ => rbm.chain = Some(h),
        }
    }

    // ── Gradient ────────────────────────────────────────────────────────
    let inv = 1.0 / batch;
    let mut w = (&v0.t_dot(&h0_mean) - &vk.t_dot(&hk_mean)).scale(inv);
    w = &w - &rbm.w.scale(params.weight_decay);

    let (u, v2_bias) = match (v2_0, v2k.as_ref()) {
        (Some(v2_0), Some(v2k)) => {
            let u = (&v2_0.t_dot(&h0_mean) - &v2k.t_dot(&hk_mean)).scale(inv);
            let u = &u - &rbm.u.scale(params.weight_decay);
            (u, &v2_0.mean_rows() - &v2k.mean_rows())
        }
        _ => (Matrix::zeros(rbm.u.rows, rbm.u.cols), Matrix::zeros(1, rbm.config.v2_n)),
    };

    let v_bias = &v0.mean_rows() - &vk.mean_rows();
    let mut h_bias = &h0_mean.mean_rows() - &hk_mean.mean_rows();

    // ── Sparsity ────────────────────────────────────────────────────────
    if params.sparsity_constraint {
        let batch_activity = h0_mean.mean_rows();
        let q = match rbm.activity.take() {
            Some(q) => &q.scale(params.sparsity_decay) + &batch_activity.scale(1.0 - params.sparsity_decay),
            None => batch_activity,
        };
        let penalty = q.map(|qj| params.sparsity_cost * (qj - params.sparsity_target));
        h_bias = &h_bias - &penalty;
        // Outer product of visible activity and the per-unit penalty.
        w = &w - &v0.mean_rows().t_dot(&penalty);
        rbm.activity = Some(q);
    }

    (Gradients { w, u, v_bias, v2_bias, h_bias }, cost)
}

/// Applies one momentum step to every parameter.
fn apply_gradients(rbm: &mut Rbm, grads: &Gradients) {
    let params = &rbm.config.train_params;
    let optimizer = Momentum::new(params.learning_rate, params.momentum, params.momentum_type);

    optimizer.step(&mut rbm.w, &mut rbm.w_vel, &grads.w);
    optimizer.step(&mut rbm.v_bias, &mut rbm.v_bias_vel, &grads.v_bias);
    optimizer.step(&mut rbm.h_bias, &mut rbm.h_bias_vel, &grads.h_bias);
    if rbm.config.is_associative() {
        optimizer.step(&mut rbm.u, &mut rbm.u_vel, &grads.u);
        optimizer.step(&mut rbm.v2_bias, &mut rbm.v2_bias_vel, &grads.v2_bias);
    }
}
