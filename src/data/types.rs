use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single market resolved from the exchange, normalized from its loose JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCandidate {
    pub id: String,
    pub event_id: String,
    pub event_title: String,
    pub event_slug: Option<String>,
    pub question: String,
    /// Last YES price, clamped to [0.01, 0.99].
    pub price: f64,
    pub liquidity: f64,
    pub close_time: Option<String>,
    pub url: Option<String>,
    pub raw: serde_json::Value,
}

/// Forecast mean temperature for one location and day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub location_name: String,
    /// Lowercased alphanumeric key used to look up sigma; "default" when empty.
    pub location_key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub target_date: NaiveDate,
    pub temperature_f: f64,
    pub source: String,
    pub raw: serde_json::Value,
}

/// Normalize a place name into a sigma lookup key.
pub fn normalize_location_key(name: &str) -> String {
    let key: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if key.is_empty() {
        "default".to_string()
    } else {
        key
    }
}
