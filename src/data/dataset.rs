use crate::error::{RbmError, Result};
use crate::math::matrix::Matrix;

/// Labels of a split: plain class indices or one row-vector per sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Classes(Vec<usize>),
    Vectors(Matrix),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Classes(c) => c.len(),
            Targets::Vectors(m) => m.rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class index of every sample; vectors are decoded by argmax.
    pub fn classes(&self) -> Vec<usize> {
        match self {
            Targets::Classes(c) => c.clone(),
            Targets::Vectors(m) => m.argmax_rows(),
        }
    }

    /// Targets as a matrix: vectors as they are, classes one-hot encoded
    /// with `n_classes` columns.
    pub fn to_matrix(&self, n_classes: usize) -> Result<Matrix> {
        match self {
            Targets::Vectors(m) => Ok(m.clone()),
            Targets::Classes(c) => one_hot(c, n_classes),
        }
    }

    pub(crate) fn select(&self, indices: &[usize]) -> Targets {
        match self {
            Targets::Classes(c) => Targets::Classes(indices.iter().map(|&i| c[i]).collect()),
            Targets::Vectors(m) => Targets::Vectors(m.select_rows(indices)),
        }
    }
}

/// One-hot rows of width `n_classes`. Fails on a class outside
/// `0..n_classes`.
pub fn one_hot(classes: &[usize], n_classes: usize) -> Result<Matrix> {
    let mut m = Matrix::zeros(classes.len(), n_classes);
    for (i, &c) in classes.iter().enumerate() {
        if c >= n_classes {
            return Err(RbmError::config(
                "labels",
                format!("class {} at row {} is outside 0..{}", c, i, n_classes),
            ));
        }
        m.set(i, c, 1.0);
    }
    Ok(m)
}

/// Images (one flattened image per row) with their targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub x: Matrix,
    pub y: Targets,
}

impl Split {
    pub fn new(x: Matrix, y: Targets) -> Self {
        assert_eq!(x.rows, y.len(), "one target per image");
        Split { x, y }
    }

    pub fn empty(width: usize) -> Self {
        Split { x: Matrix::zeros(0, width), y: Targets::Classes(Vec::new()) }
    }

    pub fn len(&self) -> usize {
        self.x.rows
    }

    pub fn is_empty(&self) -> bool {
        self.x.rows == 0
    }

    pub fn classes(&self) -> Vec<usize> {
        self.y.classes()
    }

    pub fn select(&self, indices: &[usize]) -> Split {
        Split { x: self.x.select_rows(indices), y: self.y.select(indices) }
    }
}

/// The usual train / validation / test triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub train: Split,
    pub valid: Split,
    pub test: Split,
}

impl Dataset {
    pub fn splits(&self) -> [&Split; 3] {
        [&self.train, &self.valid, &self.test]
    }
}
