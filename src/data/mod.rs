pub mod cache;
pub mod gamma_api;
pub mod sources;
pub mod types;
pub mod weather;
