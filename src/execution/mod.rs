pub mod persistence;
pub mod risk;
pub mod types;
