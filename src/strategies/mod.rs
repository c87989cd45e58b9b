pub mod backtest;
pub mod probability;
pub mod schema;
pub mod types;
pub mod weather_edge;
