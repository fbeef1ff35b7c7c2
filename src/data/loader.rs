use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::data::dataset::{one_hot, Dataset, Split, Targets};
use crate::data::idx::parse_idx_pair;
use crate::error::{RbmError, Result};
use crate::math::matrix::Matrix;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Held-out tail of the training file used as the validation split.
pub const DEFAULT_VALIDATION_SIZE: usize = 10_000;

pub const N_DIGITS: usize = 10;

/// The full, unfiltered digit dataset kept in memory.
#[derive(Debug, Clone)]
pub struct DigitSource {
    pub data: Dataset,
}

impl DigitSource {
    /// Reads the four MNIST IDX files from `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<DigitSource> {
        DigitSource::open_with_validation(dir, DEFAULT_VALIDATION_SIZE)
    }

    /// Like `open`, holding out the last `validation_size` training images.
    pub fn open_with_validation<P: AsRef<Path>>(dir: P, validation_size: usize) -> Result<DigitSource> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "... loading data");

        let (train_x, train_y) = read_pair(dir, TRAIN_IMAGES, TRAIN_LABELS)?;
        let (test_x, test_y) = read_pair(dir, TEST_IMAGES, TEST_LABELS)?;

        if validation_size > train_x.rows {
            return Err(RbmError::config(
                "validation_size",
                format!("{} exceeds the {} training images", validation_size, train_x.rows),
            ));
        }
        let cut = train_x.rows - validation_size;
        let train = Split::new(train_x.slice_rows(0, cut), Targets::Classes(train_y[..cut].to_vec()));
        let valid = Split::new(
            train_x.slice_rows(cut, train_x.rows),
            Targets::Classes(train_y[cut..].to_vec()),
        );
        let test = Split::new(test_x, Targets::Classes(test_y));

        debug!(train = train.len(), valid = valid.len(), test = test.len(), "splits");
        Ok(DigitSource { data: Dataset { train, valid, test } })
    }

    pub fn from_dataset(data: Dataset) -> DigitSource {
        DigitSource { data }
    }

    pub fn image_size(&self) -> usize {
        self.data.train.x.cols
    }
}

fn read_pair(dir: &Path, images: &str, labels: &str) -> Result<(Matrix, Vec<usize>)> {
    let image_bytes = fs::read(dir.join(images))?;
    let label_bytes = fs::read(dir.join(labels))?;
    parse_idx_pair(&image_bytes, &label_bytes)
}

/// Transforms applied after filtering and sampling, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocess {
    /// Standardise every pixel column to zero mean and unit variance.
    pub scale: bool,
    /// Binarise pixels: `>= t` becomes 1, everything else 0.
    pub threshold: Option<f64>,
    /// Replace every digit by its parity (`y mod 2`).
    pub binary_label: bool,
    /// One-hot encode the labels.
    pub label_vector: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Keep only these digits. `None` keeps all of them.
    pub digits: Option<Vec<usize>>,
    /// Samples to draw (with replacement) for train, validation and test.
    /// `None` keeps every row.
    pub n: Option<[usize; 3]>,
    pub preprocess: Preprocess,
    pub seed: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions { digits: None, n: None, preprocess: Preprocess::default(), seed: 1234 }
    }
}

impl LoadOptions {
    pub fn sized(n: [usize; 3]) -> Self {
        LoadOptions { n: Some(n), ..LoadOptions::default() }
    }

    pub fn with_digits(mut self, digits: &[usize]) -> Self {
        self.digits = Some(digits.to_vec());
        self
    }

    pub fn with_preprocess(mut self, preprocess: Preprocess) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Filters, samples and preprocesses the digits held by `source`.
pub fn load_digits(source: &DigitSource, opts: &LoadOptions) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let n = opts.n.map(|n| n.map(Some)).unwrap_or([None; 3]);
    let data = &source.data;
    Ok(Dataset {
        train: prepare_split(&data.train, n[0], opts, &mut rng)?,
        valid: prepare_split(&data.valid, n[1], opts, &mut rng)?,
        test: prepare_split(&data.test, n[2], opts, &mut rng)?,
    })
}

fn prepare_split(split: &Split, n: Option<usize>, opts: &LoadOptions, rng: &mut StdRng) -> Result<Split> {
    let mut split = match opts.digits {
        Some(ref digits) => filter_digits(split, digits)?,
        None => split.clone(),
    };
    if let Some(n) = n {
        split = sample_rows(&split, n, rng)?;
    }

    let pre = &opts.preprocess;
    if pre.scale && !split.is_empty() {
        split.x = standardize(&split.x);
    }
    if let Some(t) = pre.threshold {
        split.x = to_binary(&split.x, t);
    }
    if pre.binary_label {
        split.y = Targets::Classes(split.classes().into_iter().map(|y| y % 2).collect());
    }
    if pre.label_vector {
        split.y = Targets::Vectors(one_hot(&split.classes(), N_DIGITS)?);
    }
    Ok(split)
}

fn filter_digits(split: &Split, digits: &[usize]) -> Result<Split> {
    let classes = match split.y {
        Targets::Classes(ref c) => c,
        Targets::Vectors(_) => {
            return Err(RbmError::config("digits", "cannot filter one-hot targets"));
        }
    };
    let keep: Vec<usize> = classes
        .iter()
        .enumerate()
        .filter(|(_, y)| digits.contains(y))
        .map(|(i, _)| i)
        .collect();
    Ok(split.select(&keep))
}

/// Draws `n` rows uniformly with replacement.
fn sample_rows<R: Rng>(split: &Split, n: usize, rng: &mut R) -> Result<Split> {
    if n == 0 {
        return Ok(Split::empty(split.x.cols));
    }
    if split.is_empty() {
        return Err(RbmError::empty("split to sample from"));
    }
    let idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..split.len())).collect();
    Ok(split.select(&idx))
}

/// Thresholds every entry: `>= t` → 1, otherwise 0.
pub fn to_binary(x: &Matrix, t: f64) -> Matrix {
    x.map(|v| if v >= t { 1.0 } else { 0.0 })
}

/// Per-column standardisation. Constant columns are only centred.
pub fn standardize(x: &Matrix) -> Matrix {
    let mean = x.mean_rows();
    let centred = x.add_row(&mean.scale(-1.0));
    let var = centred.map(|v| v * v).mean_rows();
    let inv_std = var.map(|v| if v > 0.0 { 1.0 / v.sqrt() } else { 1.0 });
    let mut res = centred;
    for r in 0..res.rows {
        for (v, &s) in res.row_mut(r).iter_mut().zip(&inv_std.data) {
            *v *= s;
        }
    }
    res
}

/// Picks, for each label, a random image of that digit from `pool`.
///
/// Builds the second modality of the association experiments: a digit
/// image standing in for the label.
pub fn sample_image<R: Rng>(labels: &[usize], pool: &Split, rng: &mut R) -> Result<Matrix> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, c) in pool.classes().into_iter().enumerate() {
        by_class.entry(c).or_default().push(i);
    }

    let mut picks = Vec::with_capacity(labels.len());
    for &label in labels {
        let candidates = by_class
            .get(&label)
            .ok_or_else(|| RbmError::empty(format!("image pool for digit {}", label)))?;
        picks.push(candidates[rng.gen_range(0..candidates.len())]);
    }
    Ok(pool.x.select_rows(&picks))
}

/// Mean image of every digit present in `split`, plus the mean of those
/// means under key 10.
pub fn construct_atlas(split: &Split) -> BTreeMap<usize, Matrix> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, c) in split.classes().into_iter().enumerate() {
        by_class.entry(c).or_default().push(i);
    }

    let mut atlas: BTreeMap<usize, Matrix> = by_class
        .into_iter()
        .map(|(digit, idx)| (digit, split.x.select_rows(&idx).mean_rows()))
        .collect();

    if !atlas.is_empty() {
        let stacked = atlas
            .values()
            .fold(Matrix::zeros(0, split.x.cols), |acc, m| acc.vconcat(m));
        atlas.insert(N_DIGITS, stacked.mean_rows());
    }
    atlas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> DigitSource {
        // Each image is filled with its digit / 10.
        let split = |n: usize| {
            let labels: Vec<usize> = (0..n).map(|i| i % 10).collect();
            let rows = labels.iter().map(|&l| vec![l as f64 / 10.0; 4]).collect();
            Split::new(Matrix::from_data(rows), Targets::Classes(labels))
        };
        DigitSource::from_dataset(Dataset { train: split(40), valid: split(20), test: split(20) })
    }

    #[test]
    fn filters_and_samples() {
        let opts = LoadOptions::sized([30, 0, 5]).with_digits(&[2, 3]);
        let data = load_digits(&source(), &opts).unwrap();
        assert_eq!(data.train.len(), 30);
        assert!(data.valid.is_empty());
        assert!(data.train.classes().iter().all(|&c| c == 2 || c == 3));
        for (row, c) in data.train.x.rows_iter().zip(data.train.classes()) {
            assert_eq!(row[0], c as f64 / 10.0);
        }
    }

    #[test]
    fn label_vectors_reject_non_digit_labels() {
        let bad = |labels: Vec<usize>| {
            let x = Matrix::zeros(labels.len(), 4);
            Split::new(x, Targets::Classes(labels))
        };
        let pre = Preprocess { label_vector: true, ..Preprocess::default() };
        for labels in [vec![12, 3], vec![3, 12]] {
            let source = DigitSource::from_dataset(Dataset {
                train: bad(labels),
                valid: Split::empty(4),
                test: Split::empty(4),
            });
            let err = load_digits(&source, &LoadOptions::default().with_preprocess(pre.clone()));
            assert!(matches!(err, Err(RbmError::InvalidConfiguration { .. })));
        }
    }

    #[test]
    fn sampling_is_reproducible() {
        let opts = LoadOptions::sized([10, 0, 0]).with_seed(9);
        let a = load_digits(&source(), &opts).unwrap();
        let b = load_digits(&source(), &opts).unwrap();
        assert_eq!(a.train, b.train);
    }

    #[test]
    fn preprocessing_order() {
        let pre = Preprocess {
            threshold: Some(0.5),
            binary_label: true,
            label_vector: true,
            ..Preprocess::default()
        };
        let data = load_digits(&source(), &LoadOptions::default().with_preprocess(pre)).unwrap();
        assert!(data.train.x.data.iter().all(|&v| v == 0.0 || v == 1.0));
        match data.train.y {
            Targets::Vectors(ref m) => {
                assert_eq!(m.cols, N_DIGITS);
                // digit 3 → parity 1
                assert_eq!(m.row(3)[1], 1.0);
            }
            Targets::Classes(_) => panic!("labels should be vectorised"),
        }
    }

    #[test]
    fn standardised_columns() {
        let x = Matrix::from_data(vec![vec![1.0, 5.0], vec![3.0, 5.0]]);
        let s = standardize(&x);
        assert_eq!(s.data, vec![-1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn sampled_images_match_labels() {
        let src = source();
        let mut rng = StdRng::seed_from_u64(5);
        let imgs = sample_image(&[0, 1, 1, 0], &src.data.train, &mut rng).unwrap();
        assert_eq!(imgs.row(1)[0], 0.1);
        assert_eq!(imgs.row(3)[0], 0.0);

        let pool = load_digits(&src, &LoadOptions::default().with_digits(&[4])).unwrap();
        assert!(sample_image(&[5], &pool.train, &mut rng).is_err());
    }

    #[test]
    fn atlas_means() {
        let atlas = construct_atlas(&source().data.train);
        assert_eq!(atlas.len(), 11);
        assert!((atlas[&7].data[0] - 0.7).abs() < 1e-12);
        assert!((atlas[&10].data[0] - 0.45).abs() < 1e-12);
    }
}
