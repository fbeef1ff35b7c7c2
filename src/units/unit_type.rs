use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;
use crate::math::sampling::{sigmoid, standard_normal};

/// The distribution a layer of RBM units follows given its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Bernoulli units with a logistic mean.
    Binary,
    /// Unit-variance Gaussian units; the mean is the raw input.
    Gaussian,
    /// Noisy rectified linear units (Nair & Hinton).
    NoisyRelu,
}

impl Default for UnitType {
    fn default() -> Self {
        UnitType::Binary
    }
}

impl UnitType {
    /// Mean activation for a single pre-activation value.
    pub fn function(&self, x: f64) -> f64 {
        match self {
            UnitType::Binary => sigmoid(x),
            UnitType::Gaussian => x,
            UnitType::NoisyRelu => x.max(0.0),
        }
    }

    pub fn activate(&self, pre: &Matrix) -> Matrix {
        pre.map(|x| self.function(x))
    }

    /// Draws a state for every unit. `mean` is `activate(pre)`.
    pub fn sample<R: Rng + ?Sized>(&self, mean: &Matrix, pre: &Matrix, rng: &mut R) -> Matrix {
        match self {
            UnitType::Binary => {
                mean.map_with_rng(rng, |p, rng| if rng.gen::<f64>() < p { 1.0 } else { 0.0 })
            }
            UnitType::Gaussian => mean.map_with_rng(rng, |m, rng| m + standard_normal(rng)),
            UnitType::NoisyRelu => pre.map_with_rng(rng, |x, rng| {
                let noisy = x + standard_normal(rng) * sigmoid(x).sqrt();
                noisy.max(0.0)
            }),
        }
    }

    /// Visible-layer contribution to the free energy of each row of `v`.
    pub fn free_energy_term(&self, v: &Matrix, bias: &Matrix) -> Vec<f64> {
        match self {
            UnitType::Gaussian => v
                .rows_iter()
                .map(|row| {
                    row.iter()
                        .zip(&bias.data)
                        .map(|(x, b)| 0.5 * (x - b).powi(2))
                        .sum()
                })
                .collect(),
            // ReLU visible units are treated like binary ones for the bias term.
            UnitType::Binary | UnitType::NoisyRelu => v
                .rows_iter()
                .map(|row| -row.iter().zip(&bias.data).map(|(x, b)| x * b).sum::<f64>())
                .collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnitType::Binary => "binary",
            UnitType::Gaussian => "gaussian",
            UnitType::NoisyRelu => "relu",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn binary_samples_are_zero_or_one() {
        let mut rng = StdRng::seed_from_u64(3);
        let pre = Matrix::gaussian(5, 8, 1.0, &mut rng);
        let mean = UnitType::Binary.activate(&pre);
        assert!(mean.data.iter().all(|&p| p > 0.0 && p < 1.0));
        let s = UnitType::Binary.sample(&mean, &pre, &mut rng);
        assert!(s.data.iter().all(|&x| x == 0.0 || x == 1.0));
    }

    #[test]
    fn relu_samples_are_non_negative() {
        let mut rng = StdRng::seed_from_u64(4);
        let pre = Matrix::gaussian(5, 8, 3.0, &mut rng);
        let mean = UnitType::NoisyRelu.activate(&pre);
        let s = UnitType::NoisyRelu.sample(&mean, &pre, &mut rng);
        assert!(s.data.iter().all(|&x| x >= 0.0));
        assert_eq!(UnitType::NoisyRelu.function(-2.0), 0.0);
        assert_eq!(UnitType::NoisyRelu.function(1.5), 1.5);
    }

    #[test]
    fn gaussian_term_is_quadratic() {
        let v = Matrix::from_data(vec![vec![1.0, 3.0]]);
        let b = Matrix::row_vector(vec![0.0, 1.0]);
        assert_eq!(UnitType::Gaussian.free_energy_term(&v, &b), vec![0.5 + 2.0]);
        assert_eq!(UnitType::Binary.free_energy_term(&v, &b), vec![-3.0]);
    }
}
