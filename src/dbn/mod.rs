pub mod dbn;
pub mod associative;

pub use dbn::{Dbn, DbnConfig};
pub use associative::{AdbnConfig, AdbnTrainHistory, AdbnTrainPlan, AssociativeDbn};
