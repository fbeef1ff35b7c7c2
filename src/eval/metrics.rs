use crate::error::{RbmError, Result};
use crate::math::matrix::Matrix;

/// Fraction of rows whose argmax matches the label.
pub fn classification_rate(probabilities: &Matrix, labels: &[usize]) -> Result<f64> {
    if probabilities.rows != labels.len() {
        return Err(RbmError::dimension(labels.len(), probabilities.rows, "classification_rate"));
    }
    if labels.is_empty() {
        return Err(RbmError::empty("labels"));
    }
    let hits = probabilities
        .argmax_rows()
        .iter()
        .zip(labels)
        .filter(|(a, b)| a == b)
        .count();
    Ok(hits as f64 / labels.len() as f64)
}

/// Mean squared difference between two same-shape matrices.
pub fn reconstruction_error(a: &Matrix, b: &Matrix) -> Result<f64> {
    if a.shape() != b.shape() {
        return Err(RbmError::dimension(a.data.len(), b.data.len(), "reconstruction_error"));
    }
    Ok((a - b).map(|d| d * d).mean())
}
