use crate::math::matrix::Matrix;
use crate::rbm::config::MomentumType;

/// Momentum gradient ascent on a single parameter tensor.
pub struct Momentum {
    pub learning_rate: f64,
    pub momentum: f64,
    pub kind: MomentumType,
}

impl Momentum {
    pub fn new(learning_rate: f64, momentum: f64, kind: MomentumType) -> Momentum {
        Momentum { learning_rate, momentum, kind }
    }

    /// Moves `param` along `grad` (an ascent direction) and updates its
    /// velocity buffer in place.
    ///
    /// Classical: `vel ← m·vel + lr·grad`, `param ← param + vel`.
    /// Nesterov (Bengio et al. 2013 form):
    /// `param ← param − m·vel_old + (1 + m)·vel_new`.
    pub fn step(&self, param: &mut Matrix, velocity: &mut Matrix, grad: &Matrix) {
        assert_eq!(param.shape(), grad.shape(), "gradient does not match parameter");
        assert_eq!(param.shape(), velocity.shape(), "velocity does not match parameter");
        let m = self.momentum;
        let lr = self.learning_rate;
        for ((p, v), &g) in param.data.iter_mut().zip(velocity.data.iter_mut()).zip(&grad.data) {
            let prev = *v;
            *v = m * prev + lr * g;
            match self.kind {
                MomentumType::Classical => *p += *v,
                MomentumType::Nesterov => *p += -m * prev + (1.0 + m) * *v,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_without_history() {
        let grad = Matrix::row_vector(vec![1.0, -2.0]);
        let mut p = Matrix::zeros(1, 2);
        let mut v = Matrix::zeros(1, 2);
        Momentum::new(0.1, 0.5, MomentumType::Classical).step(&mut p, &mut v, &grad);
        assert_eq!(p.data, vec![0.1, -0.2]);
        assert_eq!(v.data, vec![0.1, -0.2]);

        let mut p = Matrix::zeros(1, 2);
        let mut v = Matrix::zeros(1, 2);
        Momentum::new(0.1, 0.5, MomentumType::Nesterov).step(&mut p, &mut v, &grad);
        // (1 + m) · lr · g
        assert!((p.data[0] - 0.15).abs() < 1e-12);
        assert!((p.data[1] + 0.3).abs() < 1e-12);
    }

    #[test]
    fn velocity_accumulates() {
        let grad = Matrix::row_vector(vec![1.0]);
        let mut p = Matrix::zeros(1, 1);
        let mut v = Matrix::zeros(1, 1);
        let opt = Momentum::new(1.0, 0.5, MomentumType::Classical);
        opt.step(&mut p, &mut v, &grad);
        opt.step(&mut p, &mut v, &grad);
        assert_eq!(v.data, vec![1.5]);
        assert_eq!(p.data, vec![2.5]);
    }
}
