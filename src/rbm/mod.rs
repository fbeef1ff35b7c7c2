pub mod config;
pub mod rbm;

pub use config::{CdType, MomentumType, RbmConfig, TrainParam};
pub use rbm::{LayerSample, Rbm, VisibleSample};
