use rand::Rng;
use std::f64::consts::PI;

use crate::math::matrix::Matrix;

/// Samples a single value from N(0, 1) using the Box-Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Draw two independent uniform samples in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// `ln(1 + e^x)`, stable for large |x|.
pub fn softplus(x: f64) -> f64 {
    if x > 30.0 {
        x
    } else if x < -30.0 {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}

/// Draws a 0/1 matrix where each entry is 1 with the probability held in `p`.
pub fn bernoulli<R: Rng + ?Sized>(p: &Matrix, rng: &mut R) -> Matrix {
    p.map_with_rng(rng, |prob, rng| if rng.gen::<f64>() < prob { 1.0 } else { 0.0 })
}

/// 0/1 mask of the given shape with retain probability `keep`.
pub fn bernoulli_mask<R: Rng + ?Sized>(rows: usize, cols: usize, keep: f64, rng: &mut R) -> Matrix {
    let data = (0..rows * cols)
        .map(|_| if rng.gen::<f64>() < keep { 1.0 } else { 0.0 })
        .collect();
    Matrix::from_vec(rows, cols, data)
}

impl Matrix {
    /// Like `map` but threads a random source through every element, in
    /// row-major order.
    pub fn map_with_rng<R, F>(&self, rng: &mut R, functor: F) -> Matrix
    where
        R: Rng + ?Sized,
        F: Fn(f64, &mut R) -> f64,
    {
        let data = self.data.iter().map(|&x| functor(x, rng)).collect();
        Matrix::from_vec(self.rows, self.cols, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn normal_has_unit_moments() {
        let mut rng = StdRng::seed_from_u64(1);
        let n = 20_000;
        let xs: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = xs.iter().sum::<f64>() / n as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.05, "variance {}", var);
    }

    #[test]
    fn bernoulli_respects_extremes() {
        let mut rng = StdRng::seed_from_u64(2);
        let p = Matrix::from_data(vec![vec![0.0, 1.0, 0.0, 1.0]]);
        assert_eq!(bernoulli(&p, &mut rng), p);
    }

    #[test]
    fn softplus_is_stable() {
        assert_eq!(softplus(100.0), 100.0);
        assert!(softplus(-100.0) >= 0.0);
        assert!((softplus(0.0) - 2f64.ln()).abs() < 1e-12);
    }
}
