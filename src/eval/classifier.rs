use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::data::dataset::one_hot;
use crate::error::{RbmError, Result};
use crate::eval::cross_entropy::{softmax_rows, CrossEntropyLoss};
use crate::eval::metrics::classification_rate;
use crate::math::matrix::Matrix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig { learning_rate: 0.1, epochs: 50, batch_size: 20, seed: 42 }
    }
}

/// Multinomial logistic regression used to score generated images.
#[derive(Debug, Clone)]
pub struct SimpleClassifier {
    config: ClassifierConfig,
    weights: Matrix,
    bias: Matrix,
}

impl SimpleClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        SimpleClassifier {
            config,
            weights: Matrix::default(),
            bias: Matrix::default(),
        }
    }

    /// Fits a fresh classifier to `x` / `labels` with default settings.
    pub fn fitted(x: &Matrix, labels: &[usize]) -> Result<Self> {
        let mut clf = SimpleClassifier::new(ClassifierConfig::default());
        clf.fit(x, labels)?;
        Ok(clf)
    }

    pub fn n_classes(&self) -> usize {
        self.bias.cols
    }

    /// Shuffled mini-batch gradient descent on the cross-entropy loss.
    /// Resets any previously learned weights. Returns the final epoch loss.
    pub fn fit(&mut self, x: &Matrix, labels: &[usize]) -> Result<f64> {
        if x.rows != labels.len() {
            return Err(RbmError::dimension(x.rows, labels.len(), "SimpleClassifier::fit"));
        }
        if labels.is_empty() {
            return Err(RbmError::empty("training labels"));
        }
        if self.config.batch_size == 0 {
            return Err(RbmError::config("batch_size", "must be at least 1"));
        }

        let n_classes = labels.iter().copied().max().map_or(2, |m| (m + 1).max(2));
        let targets = one_hot(labels, n_classes)?;
        self.weights = Matrix::zeros(x.cols, n_classes);
        self.bias = Matrix::zeros(1, n_classes);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..x.rows).collect();
        let mut epoch_loss = 0.0;

        for epoch in 1..=self.config.epochs {
            indices.shuffle(&mut rng);
            epoch_loss = 0.0;
            for batch in indices.chunks(self.config.batch_size) {
                let xb = x.select_rows(batch);
                let yb = targets.select_rows(batch);
                let p = self.forward(&xb);
                epoch_loss += CrossEntropyLoss::loss(&p, &yb) * batch.len() as f64;

                let delta = CrossEntropyLoss::derivative(&p, &yb);
                let step = self.config.learning_rate / batch.len() as f64;
                self.weights = &self.weights - &xb.t_dot(&delta).scale(step);
                self.bias = &self.bias - &delta.mean_rows().scale(self.config.learning_rate);
            }
            epoch_loss /= x.rows as f64;
            debug!(epoch, loss = epoch_loss, "classifier epoch");
        }
        Ok(epoch_loss)
    }

    fn forward(&self, x: &Matrix) -> Matrix {
        softmax_rows(&x.dot(&self.weights).add_row(&self.bias))
    }

    fn check_fitted(&self, x: &Matrix) -> Result<()> {
        if self.bias.is_empty() {
            return Err(RbmError::config("classifier", "predict called before fit"));
        }
        if x.cols != self.weights.rows {
            return Err(RbmError::dimension(self.weights.rows, x.cols, "SimpleClassifier input"));
        }
        Ok(())
    }

    /// Class probabilities, one row per sample.
    pub fn predict_proba(&self, x: &Matrix) -> Result<Matrix> {
        self.check_fitted(x)?;
        Ok(self.forward(x))
    }

    pub fn classify(&self, x: &Matrix) -> Result<Vec<usize>> {
        Ok(self.predict_proba(x)?.argmax_rows())
    }

    /// Accuracy on `x` / `labels`.
    pub fn score(&self, x: &Matrix, labels: &[usize]) -> Result<f64> {
        classification_rate(&self.predict_proba(x)?, labels)
    }

    pub fn error_rate(&self, x: &Matrix, labels: &[usize]) -> Result<f64> {
        Ok(1.0 - self.score(x, labels)?)
    }
}
