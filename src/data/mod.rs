pub mod idx;
pub mod dataset;
pub mod loader;

pub use dataset::{one_hot, Dataset, Split, Targets};
pub use loader::{
    construct_atlas, load_digits, sample_image, standardize, to_binary, DigitSource, LoadOptions,
    Preprocess,
};
