pub mod error;
pub mod config;
pub mod math;
pub mod units;
pub mod rbm;
pub mod optim;
pub mod train;
pub mod dbn;
pub mod data;
pub mod eval;
pub mod experiment;

// Convenience re-exports
pub use error::{RbmError, Result};
pub use math::matrix::Matrix;
pub use units::UnitType;
pub use rbm::{CdType, MomentumType, Rbm, RbmConfig, TrainParam};
pub use train::{EpochStats, TrainMonitor};
pub use dbn::{AdbnConfig, AdbnTrainPlan, AssociativeDbn, Dbn, DbnConfig};
pub use data::{load_digits, DigitSource, LoadOptions, Preprocess};
pub use eval::SimpleClassifier;
