use crate::math::matrix::Matrix;

/// Categorical cross-entropy between softmax outputs and one-hot targets.
pub struct CrossEntropyLoss;

/// Keeps log() away from -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// Mean over rows of `-sum(expected * ln(predicted))`.
    pub fn loss(predicted: &Matrix, expected: &Matrix) -> f64 {
        if predicted.rows == 0 {
            return 0.0;
        }
        let total: f64 = predicted
            .data
            .iter()
            .zip(&expected.data)
            .map(|(p, e)| -e * (p + EPS).ln())
            .sum();
        total / predicted.rows as f64
    }

    /// Gradient of softmax + cross-entropy w.r.t. the logits:
    ///   ∂L/∂z = predicted - expected
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        predicted - expected
    }
}

/// Row-wise softmax, shifted by each row's maximum for stability.
pub fn softmax_rows(logits: &Matrix) -> Matrix {
    let mut res = logits.clone();
    for r in 0..res.rows {
        let row = res.row_mut(r);
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for x in row.iter_mut() {
            *x = (*x - max).exp();
            sum += *x;
        }
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_rows_sum_to_one() {
        let z = Matrix::from_data(vec![vec![1000.0, 1000.0], vec![0.0, 2.0_f64.ln()]]);
        let p = softmax_rows(&z);
        assert!((p.get(0, 0) - 0.5).abs() < 1e-12);
        assert!((p.get(1, 1) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn perfect_prediction_costs_nothing() {
        let y = Matrix::from_data(vec![vec![0.0, 1.0]]);
        assert!(CrossEntropyLoss::loss(&y, &y) < 1e-9);
        let bad = Matrix::from_data(vec![vec![0.9, 0.1]]);
        assert!(CrossEntropyLoss::loss(&bad, &y) > 2.0);
        assert_eq!(CrossEntropyLoss::derivative(&bad, &y).data, vec![0.9, 0.1 - 1.0]);
    }
}
