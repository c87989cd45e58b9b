use serde::{Deserialize, Serialize};
use crate::strategies::types::{GateResult, SchemaSide};

/// Historical analysis row as read back for backtesting.
///
/// Numeric columns stay optional: rows written by older schema versions or hand-edited
/// rows may be missing them, and the aggregator decides what is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRow {
    pub id: i64,
    pub event_title: String,
    pub market_question: String,
    pub risk_profile: String,
    pub signal: String,
    pub price: Option<f64>,
    pub p_model: Option<f64>,
    pub edge: Option<f64>,
    pub ev_net: Option<f64>,
    pub created_at: String,
}

/// Which prior analyses count as comparable history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub schema_side: Option<SchemaSide>,
    pub location_key: Option<String>,
    pub exclude_id: Option<i64>,
    pub limit: usize,
}

/// Keys of a stored analysis used to select its backtest history.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRow {
    pub id: i64,
    pub schema_side: Option<SchemaSide>,
    pub location_key: Option<String>,
}

/// Cached summary text keyed by payload hash.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSummary {
    pub id: i64,
    pub cache_key: String,
    pub summary: String,
    pub source: String,
    pub updated_at: String,
}

/// A stored analysis as read back for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysis {
    pub id: i64,
    pub source_market_id: Option<String>,
    pub event_title: String,
    pub event_url: Option<String>,
    pub market_question: String,
    pub schema_side: Option<SchemaSide>,
    pub threshold_f: Option<f64>,
    pub location_name: Option<String>,
    pub target_date: Option<String>,
    pub close_time: Option<String>,
    pub price: Option<f64>,
    pub liquidity: Option<f64>,
    pub forecast_temp_f: Option<f64>,
    pub sigma_f: Option<f64>,
    pub risk_profile: String,
    pub p_model: Option<f64>,
    pub edge: Option<f64>,
    pub ev_net: Option<f64>,
    pub gates: GateResult,
    pub signal: String,
    pub status: String,
    pub unsupported_reason: Option<String>,
    pub summary: Option<String>,
    pub created_at: String,
}
