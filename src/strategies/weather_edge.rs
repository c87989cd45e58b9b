use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ai::summary::rule_based_summary;
use crate::config::AnalysisConfig;
use crate::data::sources::{
    ForecastSource, MarketSource, ResultStore, SigmaStore, SummaryGenerator, SummaryPayload,
};
use crate::data::types::{ForecastPoint, MarketCandidate};
use crate::execution::risk::{derive_signal, evaluate_gates, GateInputs};
use crate::strategies::probability::{compute_edge, compute_ev_net, probability_for_threshold};
use crate::strategies::schema::{infer_location_and_date_on, parse_threshold_schema};
use crate::strategies::types::{
    AnalysisResult, AnalysisStatus, ForecastSnapshot, GateResult, MarketSnapshot, Metrics,
    RiskProfile, Signal, Snapshots, ThresholdSchema,
};

const DEFAULT_SIGMA_KEY: &str = "default";

/// Upstream failures that end an analysis with `status = error`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Could not resolve a Polymarket weather market from provided URL/title.")]
    MarketNotFound,
    #[error("Unable to fetch weather forecast for this market.")]
    ForecastUnavailable,
    #[error("Unable to load forecast sigma for location {0}.")]
    SigmaUnavailable(String),
    #[error("{step} timed out after {secs}s.")]
    Timeout { step: &'static str, secs: u64 },
}

/// One analysis request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisInput {
    pub event_title: Option<String>,
    pub event_url: Option<String>,
    pub risk_profile: RiskProfile,
}

/// External services the strategy reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub markets: Arc<dyn MarketSource>,
    pub forecasts: Arc<dyn ForecastSource>,
    pub sigmas: Arc<dyn SigmaStore>,
    pub summaries: Arc<dyn SummaryGenerator>,
    pub results: Arc<dyn ResultStore>,
}

pub struct WeatherEdgeStrategy {
    config: AnalysisConfig,
    deps: Collaborators,
}

impl WeatherEdgeStrategy {
    pub fn new(config: AnalysisConfig, deps: Collaborators) -> Self {
        Self { config, deps }
    }

    /// Analyze one weather market against the current time.
    ///
    /// Never fails: upstream problems come back as `status = error` results, which are
    /// not persisted. Unsupported questions are persisted and stop before any forecast
    /// is fetched.
    pub async fn analyze(&self, input: &AnalysisInput) -> AnalysisResult {
        self.analyze_at(input, Utc::now()).await
    }

    pub async fn analyze_at(&self, input: &AnalysisInput, now: DateTime<Utc>) -> AnalysisResult {
        // 1. Resolve market
        let market = match self.resolve_market(input).await {
            Ok(market) => market,
            Err(e) => {
                warn!("Market resolution failed: {}", e);
                return market_error(input, &e);
            }
        };

        info!(
            "Analyzing market {}: {} (price={:.3}, liquidity={:.0})",
            market.id, market.question, market.price, market.liquidity
        );

        // 2. Parse schema, short-circuit unsupported questions
        let schema = parse_threshold_schema(&market.question);
        let Some((side, threshold_f)) = schema.threshold() else {
            info!(
                "Unsupported market {}: {}",
                market.id,
                schema.reason.as_deref().unwrap_or("unsupported schema")
            );
            let mut result = unsupported_result(input, &market, schema);
            result.id = self.persist(&result).await;
            return result;
        };

        // 3. Forecast
        let forecast = match self.fetch_forecast(&market, now.date_naive()).await {
            Ok(forecast) => forecast,
            Err(e) => {
                warn!("Forecast unavailable for market {}: {}", market.id, e);
                return upstream_error(input, &market, schema, &e, "Forecast could not be loaded.");
            }
        };

        // 4. Sigma
        let sigma_f = match self.resolve_sigma(&forecast.location_key).await {
            Ok(sigma) => sigma,
            Err(e) => {
                warn!("Sigma unavailable for {}: {}", forecast.location_key, e);
                return upstream_error(input, &market, schema, &e, "Forecast uncertainty could not be loaded.");
            }
        };

        // 5. Score
        let p_model = probability_for_threshold(side, threshold_f, forecast.temperature_f, sigma_f);
        let edge = p_model.map(|p| compute_edge(p, market.price));
        let ev_net = p_model.map(|p| compute_ev_net(p, market.price, input.risk_profile));

        let gates = evaluate_gates(&GateInputs {
            risk_profile: input.risk_profile,
            liquidity: market.liquidity,
            close_time: market.close_time.as_deref(),
            edge,
            sigma_f: Some(sigma_f),
            is_schema_supported: true,
            now,
        });
        let signal = derive_signal(&gates, ev_net);

        info!(
            "Market {}: {} threshold={:.1}°F forecast={:.1}°F sigma={:.2} p_model={:?} edge={:?} ev_net={:?} -> {}",
            market.id, side, threshold_f, forecast.temperature_f, sigma_f, p_model, edge, ev_net, signal
        );
        if !gates.all_passed() {
            debug!("Failed gates: {}", gates.failed().join(", "));
        }

        // 6. Summary
        let payload = SummaryPayload {
            event_title: market.event_title.clone(),
            question: market.question.clone(),
            risk_profile: input.risk_profile,
            signal,
            market_price: market.price,
            forecast_temp_f: forecast.temperature_f,
            threshold_f,
            side,
            sigma_f,
            p_model,
            edge,
            ev_net,
            gates,
        };
        let summary = self.summarize(&payload).await;

        // 7. Persist
        let mut result = AnalysisResult {
            id: None,
            status: AnalysisStatus::Ok,
            reason: None,
            signal,
            risk_profile: input.risk_profile,
            market_id: Some(market.id.clone()),
            event_id: Some(market.event_id.clone()),
            event_url: event_url(input, &market),
            event_title: market.event_title.clone(),
            market_question: market.question.clone(),
            schema,
            market: market_snapshot(&market),
            forecast: ForecastSnapshot {
                location_name: Some(forecast.location_name.clone()),
                location_key: Some(forecast.location_key.clone()),
                target_date: Some(forecast.target_date.format("%Y-%m-%d").to_string()),
                temperature_f: Some(forecast.temperature_f),
                sigma_f: Some(sigma_f),
                source: Some(forecast.source.clone()),
            },
            metrics: Metrics { p_model, edge, ev_net },
            gates,
            summary,
            snapshots: Snapshots {
                market: market.raw,
                forecast: forecast.raw,
            },
        };
        result.id = self.persist(&result).await;
        result
    }

    /// Run an upstream call under the configured timeout.
    async fn bounded<T, F>(&self, step: &'static str, fut: F) -> Result<Result<T>, AnalysisError>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.config.upstream_timeout();
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AnalysisError::Timeout {
                step,
                secs: limit.as_secs(),
            })
    }

    async fn resolve_market(&self, input: &AnalysisInput) -> Result<MarketCandidate, AnalysisError> {
        let lookup = self.deps.markets.resolve_candidate(
            input.event_title.as_deref(),
            input.event_url.as_deref(),
        );

        match self.bounded("Market lookup", lookup).await? {
            Ok(Some(market)) => Ok(market),
            Ok(None) => Err(AnalysisError::MarketNotFound),
            Err(e) => {
                warn!("Market source error: {:#}", e);
                Err(AnalysisError::MarketNotFound)
            }
        }
    }

    async fn fetch_forecast(
        &self,
        market: &MarketCandidate,
        today: NaiveDate,
    ) -> Result<ForecastPoint, AnalysisError> {
        let text = format!("{} {}", market.event_title, market.question);
        let target = infer_location_and_date_on(&text, today).ok_or(AnalysisError::ForecastUnavailable)?;

        debug!("Fetching forecast for {} on {}", target.location_name, target.target_date);

        let fetch = self
            .deps
            .forecasts
            .fetch_forecast(&target.location_name, target.target_date);

        match self.bounded("Forecast fetch", fetch).await? {
            Ok(Some(point)) => Ok(point),
            Ok(None) => Err(AnalysisError::ForecastUnavailable),
            Err(e) => {
                warn!("Forecast source error: {:#}", e);
                Err(AnalysisError::ForecastUnavailable)
            }
        }
    }

    /// Sigma for the location, then the "default" row, then the configured constant.
    async fn resolve_sigma(&self, location_key: &str) -> Result<f64, AnalysisError> {
        let mut keys = vec![location_key];
        if location_key != DEFAULT_SIGMA_KEY {
            keys.push(DEFAULT_SIGMA_KEY);
        }

        for key in keys {
            match self.bounded("Sigma lookup", self.deps.sigmas.lookup(key)).await? {
                Ok(Some(sigma)) => {
                    debug!("Using sigma {:.2} from key {}", sigma, key);
                    return Ok(sigma);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!("Sigma store error for {}: {:#}", key, e);
                    return Err(AnalysisError::SigmaUnavailable(location_key.to_string()));
                }
            }
        }

        debug!("No sigma rows, using fallback {:.2}", self.config.fallback_sigma_f);
        Ok(self.config.fallback_sigma_f)
    }

    async fn summarize(&self, payload: &SummaryPayload) -> String {
        match self
            .bounded("Summary", self.deps.summaries.get_or_create(payload))
            .await
        {
            Ok(Ok(outcome)) => {
                debug!("Summary from {} (cached={})", outcome.source, outcome.cached);
                outcome.text
            }
            Ok(Err(e)) => {
                warn!("Summary generation failed: {:#}", e);
                rule_based_summary(payload)
            }
            Err(e) => {
                warn!("{}", e);
                rule_based_summary(payload)
            }
        }
    }

    async fn persist(&self, result: &AnalysisResult) -> Option<i64> {
        match self.bounded("Persist", self.deps.results.persist(result)).await {
            Ok(Ok(id)) => {
                info!("Stored analysis {} ({})", id, result.status.as_str());
                Some(id)
            }
            Ok(Err(e)) => {
                warn!("Failed to persist analysis: {:#}", e);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

fn event_url(input: &AnalysisInput, market: &MarketCandidate) -> Option<String> {
    input
        .event_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .or_else(|| market.url.clone())
}

fn market_snapshot(market: &MarketCandidate) -> MarketSnapshot {
    MarketSnapshot {
        price: market.price,
        liquidity: market.liquidity,
        close_time: market.close_time.clone(),
    }
}

fn market_error(input: &AnalysisInput, error: &AnalysisError) -> AnalysisResult {
    AnalysisResult {
        id: None,
        status: AnalysisStatus::Error,
        reason: Some(error.to_string()),
        signal: Signal::NoTrade,
        risk_profile: input.risk_profile,
        market_id: None,
        event_id: None,
        event_url: input.event_url.clone(),
        event_title: input
            .event_title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Unknown event".to_string()),
        market_question: String::new(),
        schema: ThresholdSchema::unsupported("Market not found"),
        market: MarketSnapshot {
            price: 0.0,
            liquidity: 0.0,
            close_time: None,
        },
        forecast: ForecastSnapshot::default(),
        metrics: Metrics::default(),
        gates: GateResult::default(),
        summary: "Analysis failed because no matching market was found.".to_string(),
        snapshots: Snapshots {
            market: json!({}),
            forecast: json!({}),
        },
    }
}

fn unsupported_result(
    input: &AnalysisInput,
    market: &MarketCandidate,
    schema: ThresholdSchema,
) -> AnalysisResult {
    let reason = schema
        .reason
        .clone()
        .unwrap_or_else(|| "Unsupported schema".to_string());

    AnalysisResult {
        id: None,
        status: AnalysisStatus::Unsupported,
        reason: Some(reason.clone()),
        signal: Signal::NoTrade,
        risk_profile: input.risk_profile,
        market_id: Some(market.id.clone()),
        event_id: Some(market.event_id.clone()),
        event_url: event_url(input, market),
        event_title: market.event_title.clone(),
        market_question: market.question.clone(),
        schema,
        market: market_snapshot(market),
        forecast: ForecastSnapshot::default(),
        metrics: Metrics::default(),
        gates: GateResult::default(),
        summary: reason,
        snapshots: Snapshots {
            market: market.raw.clone(),
            forecast: json!({}),
        },
    }
}

fn upstream_error(
    input: &AnalysisInput,
    market: &MarketCandidate,
    schema: ThresholdSchema,
    error: &AnalysisError,
    summary: &str,
) -> AnalysisResult {
    AnalysisResult {
        id: None,
        status: AnalysisStatus::Error,
        reason: Some(error.to_string()),
        signal: Signal::NoTrade,
        risk_profile: input.risk_profile,
        market_id: Some(market.id.clone()),
        event_id: Some(market.event_id.clone()),
        event_url: event_url(input, market),
        event_title: market.event_title.clone(),
        market_question: market.question.clone(),
        schema,
        market: market_snapshot(market),
        forecast: ForecastSnapshot::default(),
        metrics: Metrics::default(),
        gates: GateResult {
            supported_schema: true,
            ..GateResult::default()
        },
        summary: summary.to_string(),
        snapshots: Snapshots {
            market: market.raw.clone(),
            forecast: json!({}),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::summary::SummaryService;
    use crate::data::cache::SummaryCache;
    use crate::execution::persistence::AnalysisDatabase;
    use crate::strategies::types::SchemaSide;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeMarkets {
        market: Option<MarketCandidate>,
    }

    #[async_trait]
    impl MarketSource for FakeMarkets {
        async fn resolve_candidate(
            &self,
            _event_title: Option<&str>,
            _event_url: Option<&str>,
        ) -> Result<Option<MarketCandidate>> {
            Ok(self.market.clone())
        }
    }

    struct FakeForecasts {
        temperature_f: Option<f64>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        requested: Mutex<Option<(String, NaiveDate)>>,
    }

    impl FakeForecasts {
        fn returning(temperature_f: Option<f64>) -> Self {
            Self {
                temperature_f,
                delay: None,
                calls: AtomicUsize::new(0),
                requested: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ForecastSource for FakeForecasts {
        async fn fetch_forecast(
            &self,
            location_name: &str,
            target_date: NaiveDate,
        ) -> Result<Option<ForecastPoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.requested.lock() = Some((location_name.to_string(), target_date));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            Ok(self.temperature_f.map(|temperature_f| ForecastPoint {
                location_name: "New York".to_string(),
                location_key: "newyork".to_string(),
                latitude: 40.71,
                longitude: -74.01,
                target_date,
                temperature_f,
                source: "test".to_string(),
                raw: json!({ "daily": {} }),
            }))
        }
    }

    struct NoSigma;

    #[async_trait]
    impl SigmaStore for NoSigma {
        async fn lookup(&self, _location_key: &str) -> Result<Option<f64>> {
            Ok(None)
        }
    }

    struct BrokenSigma;

    #[async_trait]
    impl SigmaStore for BrokenSigma {
        async fn lookup(&self, _location_key: &str) -> Result<Option<f64>> {
            anyhow::bail!("database is locked")
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 30, 12, 0, 0).unwrap()
    }

    fn market(question: &str, liquidity: f64) -> MarketCandidate {
        MarketCandidate {
            id: "540816".to_string(),
            event_id: "ev-1".to_string(),
            event_title: "Highest temperature in NYC on June 1?".to_string(),
            event_slug: Some("highest-temperature-in-nyc-on-june-1".to_string()),
            question: question.to_string(),
            price: 0.30,
            liquidity,
            close_time: Some("2025-06-02T04:00:00Z".to_string()),
            url: Some("https://polymarket.com/event/highest-temperature-in-nyc-on-june-1".to_string()),
            raw: json!({ "id": "540816" }),
        }
    }

    const DIRECTIONAL: &str = "Will the high temperature in NYC be 90°F or above on June 1?";

    struct Harness {
        db: Arc<AnalysisDatabase>,
        forecasts: Arc<FakeForecasts>,
        strategy: WeatherEdgeStrategy,
    }

    fn harness(
        market: Option<MarketCandidate>,
        forecasts: FakeForecasts,
        sigmas: Option<Arc<dyn SigmaStore>>,
        config: AnalysisConfig,
    ) -> Harness {
        let db = Arc::new(AnalysisDatabase::in_memory().unwrap());
        let forecasts = Arc::new(forecasts);
        let summaries = Arc::new(SummaryService::new(db.clone(), SummaryCache::default(), None));

        let deps = Collaborators {
            markets: Arc::new(FakeMarkets { market }),
            forecasts: forecasts.clone(),
            sigmas: sigmas.unwrap_or_else(|| db.clone() as Arc<dyn SigmaStore>),
            summaries,
            results: db.clone(),
        };

        Harness {
            db,
            forecasts,
            strategy: WeatherEdgeStrategy::new(config, deps),
        }
    }

    fn input() -> AnalysisInput {
        AnalysisInput {
            event_title: Some("Highest temperature in NYC".to_string()),
            event_url: None,
            risk_profile: RiskProfile::Balanced,
        }
    }

    #[tokio::test]
    async fn test_pass_path_is_persisted() {
        let h = harness(
            Some(market(DIRECTIONAL, 10_000.0)),
            FakeForecasts::returning(Some(95.0)),
            None,
            AnalysisConfig::default(),
        );
        h.db.upsert_sigma("newyork", 3.0).unwrap();

        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.status, AnalysisStatus::Ok);
        assert_eq!(result.signal, Signal::Pass);
        assert!(result.gates.all_passed());
        assert_eq!(result.schema.side, Some(SchemaSide::HighGte));
        assert_eq!(result.forecast.sigma_f, Some(3.0));
        assert_eq!(result.forecast.target_date.as_deref(), Some("2025-06-01"));
        assert!(result.metrics.p_model.unwrap() > 0.9);
        assert!(result.metrics.ev_net.unwrap() > 0.0);
        assert!(result.summary.starts_with("Executive Summary: PASS."));
        assert_eq!(
            result.event_url.as_deref(),
            Some("https://polymarket.com/event/highest-temperature-in-nyc-on-june-1")
        );
        assert!(result.id.is_some());
        assert_eq!(h.db.count_analyses().unwrap(), 1);

        let (location, date) = h.forecasts.requested.lock().clone().unwrap();
        assert_eq!(location, "NYC");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    }

    #[tokio::test]
    async fn test_scoring_is_reproducible_from_result() {
        let h = harness(
            Some(market(DIRECTIONAL, 10_000.0)),
            FakeForecasts::returning(Some(95.0)),
            None,
            AnalysisConfig::default(),
        );
        let result = h.strategy.analyze_at(&input(), now()).await;
        assert_eq!(result.signal, Signal::Pass);

        let p_model = result.metrics.p_model.unwrap();
        let edge = compute_edge(p_model, result.market.price);
        let ev_net = compute_ev_net(p_model, result.market.price, result.risk_profile);
        let gates = evaluate_gates(&GateInputs {
            risk_profile: result.risk_profile,
            liquidity: result.market.liquidity,
            close_time: result.market.close_time.as_deref(),
            edge: Some(edge),
            sigma_f: result.forecast.sigma_f,
            is_schema_supported: result.schema.is_supported(),
            now: now(),
        });

        assert_eq!(Some(edge), result.metrics.edge);
        assert_eq!(Some(ev_net), result.metrics.ev_net);
        assert_eq!(gates, result.gates);
        assert_eq!(derive_signal(&gates, Some(ev_net)), result.signal);
    }

    #[tokio::test]
    async fn test_thin_market_is_watch() {
        let h = harness(
            Some(market(DIRECTIONAL, 100.0)),
            FakeForecasts::returning(Some(95.0)),
            None,
            AnalysisConfig::default(),
        );
        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.signal, Signal::Watch);
        assert!(!result.gates.liquidity_ok);
        assert_eq!(result.status, AnalysisStatus::Ok);
    }

    #[tokio::test]
    async fn test_unsupported_short_circuits() {
        let h = harness(
            Some(market("Will it rain in NYC tomorrow?", 10_000.0)),
            FakeForecasts::returning(Some(95.0)),
            None,
            AnalysisConfig::default(),
        );
        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.status, AnalysisStatus::Unsupported);
        assert_eq!(result.signal, Signal::NoTrade);
        assert!(result.reason.is_some());
        assert_eq!(result.gates, GateResult::default());
        assert!(result.id.is_some());
        assert_eq!(h.forecasts.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.db.count_analyses().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_market_is_transient_error() {
        let h = harness(None, FakeForecasts::returning(Some(95.0)), None, AnalysisConfig::default());
        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.reason, Some(AnalysisError::MarketNotFound.to_string()));
        assert_eq!(result.event_title, "Highest temperature in NYC");
        assert_eq!(result.id, None);
        assert_eq!(h.db.count_analyses().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forecast_failure_is_not_persisted() {
        let h = harness(
            Some(market(DIRECTIONAL, 10_000.0)),
            FakeForecasts::returning(None),
            None,
            AnalysisConfig::default(),
        );
        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.reason, Some(AnalysisError::ForecastUnavailable.to_string()));
        assert!(result.gates.supported_schema);
        assert_eq!(result.id, None);
        assert_eq!(h.db.count_analyses().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_forecast_times_out() {
        let mut forecasts = FakeForecasts::returning(Some(95.0));
        forecasts.delay = Some(Duration::from_secs(60));
        let config = AnalysisConfig {
            upstream_timeout_secs: 5,
            ..AnalysisConfig::default()
        };
        let h = harness(Some(market(DIRECTIONAL, 10_000.0)), forecasts, None, config);

        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(result.reason.as_deref(), Some("Forecast fetch timed out after 5s."));
        assert_eq!(h.db.count_analyses().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sigma_fallback_chain() {
        // No location row: the seeded "default" row applies.
        let h = harness(
            Some(market(DIRECTIONAL, 10_000.0)),
            FakeForecasts::returning(Some(95.0)),
            None,
            AnalysisConfig::default(),
        );
        let result = h.strategy.analyze_at(&input(), now()).await;
        assert_eq!(result.forecast.sigma_f, Some(4.5));

        // No rows at all: the configured constant applies.
        let config = AnalysisConfig {
            fallback_sigma_f: 6.0,
            ..AnalysisConfig::default()
        };
        let h = harness(
            Some(market(DIRECTIONAL, 10_000.0)),
            FakeForecasts::returning(Some(95.0)),
            Some(Arc::new(NoSigma)),
            config,
        );
        let result = h.strategy.analyze_at(&input(), now()).await;
        assert_eq!(result.forecast.sigma_f, Some(6.0));
    }

    #[tokio::test]
    async fn test_sigma_store_failure_is_error() {
        let h = harness(
            Some(market(DIRECTIONAL, 10_000.0)),
            FakeForecasts::returning(Some(95.0)),
            Some(Arc::new(BrokenSigma)),
            AnalysisConfig::default(),
        );
        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.status, AnalysisStatus::Error);
        assert_eq!(
            result.reason,
            Some(AnalysisError::SigmaUnavailable("newyork".to_string()).to_string())
        );
        assert_eq!(h.db.count_analyses().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_degenerate_sigma_yields_no_trade() {
        let h = harness(
            Some(market(DIRECTIONAL, 10_000.0)),
            FakeForecasts::returning(Some(95.0)),
            None,
            AnalysisConfig::default(),
        );
        h.db.upsert_sigma("newyork", 0.0).unwrap();

        let result = h.strategy.analyze_at(&input(), now()).await;

        assert_eq!(result.status, AnalysisStatus::Ok);
        assert_eq!(result.metrics, Metrics::default());
        assert!(!result.gates.sigma_ok);
        assert!(!result.gates.edge_ok);
        assert_eq!(result.signal, Signal::NoTrade);
    }
}
