pub mod unit_type;

pub use unit_type::UnitType;
