pub mod metrics;
pub mod cross_entropy;
pub mod classifier;

pub use classifier::{ClassifierConfig, SimpleClassifier};
pub use cross_entropy::CrossEntropyLoss;
pub use metrics::{classification_rate, reconstruction_error};
