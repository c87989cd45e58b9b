//! Collaborator seams used by the analysis pipeline.
//!
//! HTTP clients and the SQLite store implement these; tests substitute in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::data::types::{ForecastPoint, MarketCandidate};
use crate::execution::types::{BacktestRow, BaselineRow, HistoryFilter};
use crate::strategies::types::{AnalysisResult, GateResult, RiskProfile, SchemaSide, Signal};

/// Resolves a user-supplied event title or URL to one market.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn resolve_candidate(
        &self,
        event_title: Option<&str>,
        event_url: Option<&str>,
    ) -> Result<Option<MarketCandidate>>;
}

#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch_forecast(
        &self,
        location_name: &str,
        target_date: NaiveDate,
    ) -> Result<Option<ForecastPoint>>;
}

/// Historical forecast error (sigma, °F) per location key.
#[async_trait]
pub trait SigmaStore: Send + Sync {
    async fn lookup(&self, location_key: &str) -> Result<Option<f64>>;
}

/// Numeric facts a summary is written from. Field order is part of the cache key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    pub event_title: String,
    pub question: String,
    pub risk_profile: RiskProfile,
    pub signal: Signal,
    pub market_price: f64,
    pub forecast_temp_f: f64,
    pub threshold_f: f64,
    pub side: SchemaSide,
    pub sigma_f: f64,
    pub p_model: Option<f64>,
    pub edge: Option<f64>,
    pub ev_net: Option<f64>,
    pub gates: GateResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub id: Option<i64>,
    pub text: String,
    pub source: String,
    pub cached: bool,
}

/// Content-addressed summaries: an identical payload returns the same text
/// without being regenerated.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn get_or_create(&self, payload: &SummaryPayload) -> Result<SummaryOutcome>;
}

/// Insert-only store of analysis results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn persist(&self, result: &AnalysisResult) -> Result<i64>;

    async fn find_baseline(&self, id: i64) -> Result<Option<BaselineRow>>;

    async fn list_history_matching(&self, filter: &HistoryFilter) -> Result<Vec<BacktestRow>>;
}
