//! End-to-end association experiments on the digit dataset.
//!
//! Every experiment takes the in-memory `DigitSource` plus a serde
//! configuration, returns a serialisable report and, when the config names
//! one, appends that report to a `ResultsLog`.

pub mod results_log;
pub mod label;
pub mod parity;
pub mod adbn;

pub use adbn::{parity_adbn, AdbnReport, ParityAdbnConfig};
pub use label::{label_association, LabelAssociationConfig, LabelAssociationReport};
pub use parity::{hidden_units_for, parity_association, ParityAssociationConfig, ParityData, ParityReport};
pub use results_log::ResultsLog;
