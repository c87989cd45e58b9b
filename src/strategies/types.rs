use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which daily quantity a market settles on, and in which direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaSide {
    HighGte,
    HighLte,
    LowGte,
    LowLte,
}

impl SchemaSide {
    /// True for the "at or above" sides.
    pub fn is_at_or_above(self) -> bool {
        matches!(self, SchemaSide::HighGte | SchemaSide::LowGte)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaSide::HighGte => "HIGH_GTE",
            SchemaSide::HighLte => "HIGH_LTE",
            SchemaSide::LowGte => "LOW_GTE",
            SchemaSide::LowLte => "LOW_LTE",
        }
    }
}

impl fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH_GTE" => Ok(SchemaSide::HighGte),
            "HIGH_LTE" => Ok(SchemaSide::HighLte),
            "LOW_GTE" => Ok(SchemaSide::LowGte),
            "LOW_LTE" => Ok(SchemaSide::LowLte),
            other => anyhow::bail!("Unknown schema side: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSupport {
    Supported,
    Unsupported,
}

/// Structured reading of a market question.
///
/// Only built through [`ThresholdSchema::supported`] and [`ThresholdSchema::unsupported`],
/// so `support == Supported` exactly when both `side` and `threshold_f` are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdSchema {
    pub support: MarketSupport,
    pub side: Option<SchemaSide>,
    pub threshold_f: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ThresholdSchema {
    pub fn supported(side: SchemaSide, threshold_f: f64) -> Self {
        Self {
            support: MarketSupport::Supported,
            side: Some(side),
            threshold_f: Some(threshold_f),
            reason: None,
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            support: MarketSupport::Unsupported,
            side: None,
            threshold_f: None,
            reason: Some(reason.into()),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.support == MarketSupport::Supported
    }

    /// Side and threshold together, only for supported schemas.
    pub fn threshold(&self) -> Option<(SchemaSide, f64)> {
        match (self.support, self.side, self.threshold_f) {
            (MarketSupport::Supported, Some(side), Some(t)) => Some((side, t)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskProfile {
    Conservative,
    Balanced,
    Aggressive,
}

/// Gate thresholds and fee assumption for a risk profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileConfig {
    pub min_liquidity: f64,
    pub min_edge: f64,
    pub fee_rate: f64,
    pub min_hours_to_close: f64,
}

const CONSERVATIVE: ProfileConfig = ProfileConfig {
    min_liquidity: 5000.0,
    min_edge: 0.04,
    fee_rate: 0.02,
    min_hours_to_close: 10.0,
};

const BALANCED: ProfileConfig = ProfileConfig {
    min_liquidity: 2000.0,
    min_edge: 0.02,
    fee_rate: 0.015,
    min_hours_to_close: 6.0,
};

const AGGRESSIVE: ProfileConfig = ProfileConfig {
    min_liquidity: 800.0,
    min_edge: 0.005,
    fee_rate: 0.01,
    min_hours_to_close: 2.0,
};

impl RiskProfile {
    pub fn config(self) -> &'static ProfileConfig {
        match self {
            RiskProfile::Conservative => &CONSERVATIVE,
            RiskProfile::Balanced => &BALANCED,
            RiskProfile::Aggressive => &AGGRESSIVE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskProfile::Conservative => "Conservative",
            RiskProfile::Balanced => "Balanced",
            RiskProfile::Aggressive => "Aggressive",
        }
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        RiskProfile::Balanced
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(RiskProfile::Conservative),
            "balanced" => Ok(RiskProfile::Balanced),
            "aggressive" => Ok(RiskProfile::Aggressive),
            other => anyhow::bail!("Unknown risk profile: {}", other),
        }
    }
}

/// Five independent admission gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub liquidity_ok: bool,
    pub close_time_ok: bool,
    pub edge_ok: bool,
    pub sigma_ok: bool,
    pub supported_schema: bool,
}

impl GateResult {
    pub fn all_passed(&self) -> bool {
        self.named().iter().all(|(_, ok)| *ok)
    }

    /// Gates paired with their wire names, in display order.
    pub fn named(&self) -> [(&'static str, bool); 5] {
        [
            ("liquidityOk", self.liquidity_ok),
            ("closeTimeOk", self.close_time_ok),
            ("edgeOk", self.edge_ok),
            ("sigmaOk", self.sigma_ok),
            ("supportedSchema", self.supported_schema),
        ]
    }

    pub fn failed(&self) -> Vec<&'static str> {
        self.named()
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Pass,
    Watch,
    NoTrade,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Pass => "PASS",
            Signal::Watch => "WATCH",
            Signal::NoTrade => "NO_TRADE",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub p_model: Option<f64>,
    pub edge: Option<f64>,
    pub ev_net: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Ok,
    Unsupported,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Ok => "ok",
            AnalysisStatus::Unsupported => "unsupported",
            AnalysisStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub price: f64,
    pub liquidity: f64,
    pub close_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSnapshot {
    pub location_name: Option<String>,
    pub location_key: Option<String>,
    pub target_date: Option<String>,
    pub temperature_f: Option<f64>,
    pub sigma_f: Option<f64>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshots {
    pub market: serde_json::Value,
    pub forecast: serde_json::Value,
}

/// Outcome of one analysis request. A new analysis always produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: Option<i64>,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub signal: Signal,
    pub risk_profile: RiskProfile,
    pub market_id: Option<String>,
    pub event_id: Option<String>,
    pub event_url: Option<String>,
    pub event_title: String,
    pub market_question: String,
    pub schema: ThresholdSchema,
    pub market: MarketSnapshot,
    pub forecast: ForecastSnapshot,
    pub metrics: Metrics,
    pub gates: GateResult,
    pub summary: String,
    pub snapshots: Snapshots,
}
